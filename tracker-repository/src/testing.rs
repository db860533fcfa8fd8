//! Test fixtures: a small workout and meal tracking domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::QueryContext;
use crate::entity::{Dateable, Entity, Relation};
use crate::repository::Repository;
use crate::store::{MemoryStore, Row, Store, Table};

const MUSCLE_GROUPS: &[&str] = &["legs", "back", "chest", "arms"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub muscle_group: String,
}

impl Exercise {
    pub fn new(name: &str, muscle_group: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            muscle_group: muscle_group.to_string(),
        }
    }
}

impl Entity for Exercise {
    const COLLECTION: &'static str = "exercises";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// Insert `n` exercises named `Exercise 01`.. with muscle groups in rotation
pub async fn seed_exercises<S: Store>(repo: &Repository<Exercise, S>, n: usize) -> Vec<Exercise> {
    let ctx = QueryContext::background();
    let mut created = Vec::with_capacity(n);
    for i in 0..n {
        let mut exercise = Exercise::new(
            &format!("Exercise {:02}", i + 1),
            MUSCLE_GROUPS[i % MUSCLE_GROUPS.len()],
        );
        repo.create(&ctx, &mut exercise).await.unwrap();
        created.push(exercise);
    }
    created
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
    #[serde(default)]
    pub id: u64,
    pub date: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl WorkoutLog {
    pub fn new(date: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self {
            id: 0,
            date,
            duration_minutes,
        }
    }
}

impl Entity for WorkoutLog {
    const COLLECTION: &'static str = "workout_logs";
    const DATE_FIELD: Option<&'static str> = Some("date");

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Dateable for WorkoutLog {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub calories: u32,
}

impl Food {
    pub fn new(name: &str, calories: u32) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            calories,
        }
    }
}

impl Entity for Food {
    const COLLECTION: &'static str = "foods";
    const SOFT_DELETE: bool = false;

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealItem {
    #[serde(default)]
    pub id: u64,
    pub meal_id: u64,
    pub food_id: u64,
    pub grams: f64,
    #[serde(default)]
    pub food: Option<Food>,
}

impl MealItem {
    pub fn new(meal_id: u64, food_id: u64, grams: f64) -> Self {
        Self {
            id: 0,
            meal_id,
            food_id,
            grams,
            food: None,
        }
    }
}

impl Entity for MealItem {
    const COLLECTION: &'static str = "meal_items";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn relations() -> Vec<Relation> {
        vec![Relation::belongs_to::<Food>("food", "food_id")]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub items: Vec<MealItem>,
}

impl Meal {
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            items: Vec::new(),
        }
    }
}

impl Entity for Meal {
    const COLLECTION: &'static str = "meals";
    const PRELOADS: &'static [&'static str] = &["items.food"];

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn relations() -> Vec<Relation> {
        vec![Relation::has_many::<MealItem>("items", "meal_id")]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl WorkoutPlan {
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            exercises: Vec::new(),
        }
    }
}

impl Entity for WorkoutPlan {
    const COLLECTION: &'static str = "workout_plans";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn relations() -> Vec<Relation> {
        vec![Relation::many_to_many::<Exercise>(
            "exercises",
            "workout_plan_exercises",
            "workout_plan_id",
            "exercise_id",
        )]
    }
}

/// Link a plan to exercises, in the given order
pub async fn link_plan_exercises(store: &MemoryStore, plan_id: u64, exercise_ids: &[u64]) {
    let rows: Vec<Row> = exercise_ids
        .iter()
        .map(|exercise_id| {
            let mut row = Row::new();
            row.insert("workout_plan_id".to_string(), json!(plan_id));
            row.insert("exercise_id".to_string(), json!(exercise_id));
            row
        })
        .collect();
    store
        .insert(&Table::plain("workout_plan_exercises"), rows)
        .await
        .unwrap();
}
