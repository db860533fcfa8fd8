//! Eager loading of relation paths
//!
//! Paths such as `items.food` are merged into a tree and loaded level by
//! level: one `IN (...)` query per relation, then the children of the fetched
//! rows, then the related rows are attached to their owners under the
//! relation name. Soft-deleted related rows are skipped.

use std::collections::{BTreeMap, HashMap};

use futures::future::BoxFuture;
use serde_json::Value;

use super::{Row, Selection, Store, Table, ID};
use crate::entity::{Relation, RelationKind};
use crate::repository::{FilterCondition, OrderDirection, RepositoryError, RepositoryResult};

#[derive(Debug, Default)]
struct PathTree(BTreeMap<String, PathTree>);

impl PathTree {
    fn from_paths(paths: &[String]) -> Self {
        let mut root = Self::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.').filter(|s| !s.is_empty()) {
                node = node.0.entry(segment.to_string()).or_default();
            }
        }
        root
    }
}

/// Attach the rows named by `paths` to `rows`
pub(crate) async fn preload<S: Store>(
    store: &S,
    relations: Vec<Relation>,
    rows: &mut [Row],
    paths: &[String],
) -> RepositoryResult<()> {
    if rows.is_empty() || paths.is_empty() {
        return Ok(());
    }
    let tree = PathTree::from_paths(paths);
    load_level(store, relations, rows, &tree).await
}

fn load_level<'a, S: Store>(
    store: &'a S,
    relations: Vec<Relation>,
    rows: &'a mut [Row],
    tree: &'a PathTree,
) -> BoxFuture<'a, RepositoryResult<()>> {
    Box::pin(async move {
        for (name, children) in &tree.0 {
            let relation = relations
                .iter()
                .find(|relation| relation.name == name.as_str())
                .copied()
                .ok_or_else(|| RepositoryError::store(format!("unsupported relation \"{name}\"")))?;

            let mut related = fetch_related(store, &relation, rows).await?;
            if !children.0.is_empty() && !related.targets.is_empty() {
                load_level(store, (relation.target_relations)(), &mut related.targets, children)
                    .await?;
            }
            attach(&relation, rows, related);
        }
        Ok(())
    })
}

struct Related {
    targets: Vec<Row>,
    /// (owner id, target id) pairs for many-to-many relations
    links: Vec<(u64, u64)>,
}

async fn fetch_related<S: Store>(
    store: &S,
    relation: &Relation,
    owners: &[Row],
) -> RepositoryResult<Related> {
    let mut links = Vec::new();
    let target_ids = match relation.kind {
        RelationKind::HasMany { foreign_key } | RelationKind::HasOne { foreign_key } => {
            let owner_ids = distinct(owners.iter().filter_map(|row| id_of(row, ID)));
            if owner_ids.is_empty() {
                return Ok(Related::empty());
            }
            let selection = Selection::new(relation.target)
                .with_condition(FilterCondition::in_ids(foreign_key, owner_ids))
                .ordered_by(ID, OrderDirection::Ascending);
            return Ok(Related {
                targets: store.fetch(&selection).await?,
                links,
            });
        }
        RelationKind::BelongsTo { foreign_key } => {
            distinct(owners.iter().filter_map(|row| id_of(row, foreign_key)))
        }
        RelationKind::ManyToMany {
            join_table,
            owner_key,
            target_key,
        } => {
            let owner_ids = distinct(owners.iter().filter_map(|row| id_of(row, ID)));
            if owner_ids.is_empty() {
                return Ok(Related::empty());
            }
            let selection = Selection::new(Table::plain(join_table))
                .with_condition(FilterCondition::in_ids(owner_key, owner_ids));
            links = store
                .fetch(&selection)
                .await?
                .iter()
                .filter_map(|link| Some((id_of(link, owner_key)?, id_of(link, target_key)?)))
                .collect();
            distinct(links.iter().map(|(_, target)| *target))
        }
    };

    if target_ids.is_empty() {
        return Ok(Related { targets: Vec::new(), links });
    }
    let selection = Selection::new(relation.target)
        .with_condition(FilterCondition::in_ids(ID, target_ids))
        .ordered_by(ID, OrderDirection::Ascending);
    Ok(Related {
        targets: store.fetch(&selection).await?,
        links,
    })
}

impl Related {
    fn empty() -> Self {
        Self {
            targets: Vec::new(),
            links: Vec::new(),
        }
    }
}

fn attach(relation: &Relation, owners: &mut [Row], related: Related) {
    let name = relation.name.to_string();
    match relation.kind {
        RelationKind::HasMany { foreign_key } | RelationKind::HasOne { foreign_key } => {
            let mut by_owner: HashMap<u64, Vec<Value>> = HashMap::new();
            for target in related.targets {
                if let Some(owner) = id_of(&target, foreign_key) {
                    by_owner.entry(owner).or_default().push(Value::Object(target));
                }
            }
            let single = matches!(relation.kind, RelationKind::HasOne { .. });
            for owner in owners.iter_mut() {
                let found = id_of(owner, ID)
                    .and_then(|id| by_owner.get(&id))
                    .cloned()
                    .unwrap_or_default();
                let value = if single {
                    found.into_iter().next().unwrap_or(Value::Null)
                } else {
                    Value::Array(found)
                };
                owner.insert(name.clone(), value);
            }
        }
        RelationKind::BelongsTo { foreign_key } => {
            let by_id = index_by_id(related.targets);
            for owner in owners.iter_mut() {
                let value = id_of(owner, foreign_key)
                    .and_then(|id| by_id.get(&id))
                    .cloned()
                    .unwrap_or(Value::Null);
                owner.insert(name.clone(), value);
            }
        }
        RelationKind::ManyToMany { .. } => {
            let by_id = index_by_id(related.targets);
            for owner in owners.iter_mut() {
                let owner_id = id_of(owner, ID);
                let linked = related
                    .links
                    .iter()
                    .filter(|(link_owner, _)| Some(*link_owner) == owner_id)
                    .filter_map(|(_, target)| by_id.get(target).cloned())
                    .collect();
                owner.insert(name.clone(), Value::Array(linked));
            }
        }
    }
}

fn index_by_id(rows: Vec<Row>) -> HashMap<u64, Value> {
    rows.into_iter()
        .filter_map(|row| Some((id_of(&row, ID)?, Value::Object(row))))
        .collect()
}

fn distinct(ids: impl Iterator<Item = u64>) -> Vec<u64> {
    let mut ids: Vec<u64> = ids.collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Identifier stored in `field`, accepting numbers and numeric strings
fn id_of(row: &Row, field: &str) -> Option<u64> {
    match row.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
