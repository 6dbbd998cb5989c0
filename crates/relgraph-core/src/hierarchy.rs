//! Inheritance hierarchies expressed at the table level.
//!
//! Table-per-type hierarchies are detected from shared-primary-key foreign
//! keys. Single-table and table-per-concrete-type hierarchies leave no trace
//! in key metadata and are declared through [`HierarchyOverride`]s, which also
//! take precedence over detection for the tables they name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

use crate::error::MigrationResult;
use crate::model::{Attribute, BagId, Entity, EntityId, SchemaModel};
use crate::stats::ImportStatistics;

/// Physical storage pattern of a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InheritancePattern {
    SingleTable,
    TablePerType,
    TablePerConcreteType,
}

impl fmt::Display for InheritancePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleTable => "single-table",
            Self::TablePerType => "table-per-type",
            Self::TablePerConcreteType => "table-per-concrete-type",
        })
    }
}

/// Entities forming one hierarchy, grouped by depth (0 = root).
#[derive(Debug, Clone, Serialize)]
pub struct HierarchicalBag {
    pub id: BagId,
    pub pattern: InheritancePattern,
    pub root: EntityId,
    pub depths: BTreeMap<usize, BTreeSet<EntityId>>,
    /// Discriminator column of a single-table hierarchy.
    pub discriminator: Option<String>,
    /// Entity name -> discriminator value.
    pub discriminator_values: BTreeMap<String, String>,
}

impl HierarchicalBag {
    pub fn contains(&self, entity: EntityId) -> bool {
        self.depths.values().any(|set| set.contains(&entity))
    }

    /// Name of the entity selected by a discriminator value.
    pub fn entity_for_value(&self, value: &str) -> Option<&str> {
        self.discriminator_values
            .iter()
            .find(|(_, v)| v.as_str() == value)
            .map(|(name, _)| name.as_str())
    }
}

/// Explicit hierarchy declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyOverride {
    pub pattern: InheritancePattern,
    pub root: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub root_value: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberOverride>,
}

/// One non-root member of a declared hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberOverride {
    /// Table name, or the subtype name for single-table hierarchies.
    pub name: String,
    pub parent: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Single-table only: columns owned by this subtype.
    #[serde(default)]
    pub columns: Vec<String>,
}

struct PendingBag {
    root: EntityId,
    pattern: InheritancePattern,
    discriminator: Option<String>,
    values: BTreeMap<String, String>,
}

/// Assigns parents, inheritance levels and hierarchy bags.
///
/// Entities that fit no pattern stay flat; unusable overrides are reported
/// as warnings and ignored.
pub fn classify(
    mut model: SchemaModel,
    overrides: &[HierarchyOverride],
    detect: bool,
    stats: &ImportStatistics,
) -> MigrationResult<SchemaModel> {
    let mut claimed: BTreeMap<EntityId, InheritancePattern> = BTreeMap::new();
    let mut pending = Vec::new();

    for declared in overrides {
        if let Some(bag) = apply_override(&mut model, declared, &mut claimed, stats) {
            pending.push(bag);
        }
    }

    if detect {
        for root in detect_table_per_type(&mut model, &mut claimed, stats) {
            if !pending.iter().any(|b| b.root == root) {
                pending.push(PendingBag {
                    root,
                    pattern: InheritancePattern::TablePerType,
                    discriminator: None,
                    values: BTreeMap::new(),
                });
            }
        }
    }

    for bag in pending {
        register_bag(&mut model, bag);
    }

    stats.set_hierarchy_count(model.bags().len());
    info!(hierarchies = model.bags().len(), "Hierarchies classified");
    Ok(model)
}

fn apply_override(
    model: &mut SchemaModel,
    declared: &HierarchyOverride,
    claimed: &mut BTreeMap<EntityId, InheritancePattern>,
    stats: &ImportStatistics,
) -> Option<PendingBag> {
    let Some(root) = model.entity_by_name(&declared.root).map(|e| e.id) else {
        stats.warn(format!("hierarchy root '{}' is not a migrated table; ignored", declared.root));
        return None;
    };
    if claimed.contains_key(&root) {
        stats.warn(format!("table '{}' already belongs to a hierarchy; ignored", declared.root));
        return None;
    }
    claimed.insert(root, declared.pattern);

    let mut values = BTreeMap::new();
    match declared.pattern {
        InheritancePattern::SingleTable => {
            let root_entity = model.entity(root);
            let Some(discriminator) = declared
                .discriminator
                .as_deref()
                .and_then(|d| root_entity.attribute(d))
                .map(|a| a.name.clone())
            else {
                stats.warn(format!(
                    "single-table hierarchy '{}' needs an existing discriminator column; ignored",
                    declared.root
                ));
                claimed.remove(&root);
                return None;
            };
            if let Some(value) = &declared.root_value {
                values.insert(root_entity.name.clone(), value.clone());
            }
            for member in &declared.members {
                if let Some(id) = add_single_table_member(model, root, &discriminator, member, claimed, stats) {
                    claimed.insert(id, declared.pattern);
                    if let Some(value) = &member.value {
                        values.insert(member.name.clone(), value.clone());
                    }
                }
            }
            Some(PendingBag {
                root,
                pattern: declared.pattern,
                discriminator: Some(discriminator),
                values,
            })
        }
        pattern => {
            for member in &declared.members {
                if let Some(id) = link_table_member(model, root, pattern, member, claimed, stats) {
                    claimed.insert(id, pattern);
                }
            }
            Some(PendingBag {
                root,
                pattern,
                discriminator: None,
                values,
            })
        }
    }
}

/// Carves a virtual subtype out of the root's shared table.
fn add_single_table_member(
    model: &mut SchemaModel,
    root: EntityId,
    discriminator: &str,
    member: &MemberOverride,
    claimed: &BTreeMap<EntityId, InheritancePattern>,
    stats: &ImportStatistics,
) -> Option<EntityId> {
    let Some(parent) = model
        .entity_by_name(&member.parent)
        .map(|e| e.id)
        .filter(|id| *id == root || (claimed.contains_key(id) && model.lineage(*id)[0] == root))
    else {
        stats.warn(format!(
            "subtype '{}' names parent '{}' outside its hierarchy; ignored",
            member.name, member.parent
        ));
        return None;
    };
    if model.entity_by_name(&member.name).is_some() {
        stats.warn(format!("subtype '{}' clashes with an existing table; ignored", member.name));
        return None;
    }
    if member.value.is_none() {
        stats.warn(format!("subtype '{}' has no discriminator value; ignored", member.name));
        return None;
    }

    let root_entity = model.entity(root).clone();
    let mut moved = Vec::new();
    for column in &member.columns {
        match root_entity.attribute(column) {
            Some(a) if !a.from_primary_key && a.name != discriminator => moved.push(a.clone()),
            _ => stats.warn(format!(
                "column '{column}' cannot belong to subtype '{}'; ignored",
                member.name
            )),
        }
    }
    moved.sort();

    let names: BTreeSet<String> = moved.iter().map(|a| a.name.clone()).collect();
    model
        .entity_mut(root)
        .attributes
        .retain(|a| !names.contains(&a.name));

    let entity = Entity {
        id: EntityId(0),
        name: member.name.clone(),
        schema: root_entity.schema.clone(),
        table: root_entity.table.clone(),
        attributes: moved,
        primary_key: root_entity.primary_key.clone(),
        foreign_keys: Vec::new(),
        outbound: Vec::new(),
        inbound: Vec::new(),
        parent: Some(parent),
        inheritance_level: 0,
        bag: None,
        inherited_attributes: Vec::new(),
        parent_join: Vec::new(),
    };
    let id = model.push_entity(entity);
    debug!(subtype = %member.name, table = %root_entity.table, "Single-table subtype added");
    Some(id)
}

/// Links an existing table under its declared parent.
fn link_table_member(
    model: &mut SchemaModel,
    root: EntityId,
    pattern: InheritancePattern,
    member: &MemberOverride,
    claimed: &BTreeMap<EntityId, InheritancePattern>,
    stats: &ImportStatistics,
) -> Option<EntityId> {
    let child = model.entity_by_name(&member.name).map(|e| e.id);
    let parent = model.entity_by_name(&member.parent).map(|e| e.id);
    let (Some(child), Some(parent)) = (child, parent) else {
        stats.warn(format!(
            "hierarchy member '{}' or its parent '{}' is not a migrated table; ignored",
            member.name, member.parent
        ));
        return None;
    };
    let in_hierarchy = parent == root || (claimed.contains_key(&parent) && model.lineage(parent)[0] == root);
    if claimed.contains_key(&child) || !in_hierarchy || child == root {
        stats.warn(format!("hierarchy member '{}' cannot be placed under '{}'; ignored", member.name, member.parent));
        return None;
    }

    if pattern == InheritancePattern::TablePerType {
        let Some(join) = table_per_type_join(model, child, parent) else {
            stats.warn(format!(
                "'{}' shares no primary key shape with '{}'; ignored",
                member.name, member.parent
            ));
            return None;
        };
        model.entity_mut(child).parent_join = join;
    }
    model.entity_mut(child).parent = Some(parent);
    Some(child)
}

/// Child primary key column -> parent primary key column. Prefers a shared
/// primary key foreign key (marking it as the inheritance link), then falls
/// back to positional mapping of equally sized keys.
fn table_per_type_join(model: &mut SchemaModel, child: EntityId, parent: EntityId) -> Option<Vec<(String, String)>> {
    if let Some(link) = inheritance_link(model, child, parent) {
        model.relationship_mut(link).inheritance = true;
        let relationship = model.relationship(link);
        let entity = model.entity(child);
        return Some(
            entity
                .primary_key
                .iter()
                .filter_map(|pk| {
                    relationship
                        .column_pairs()
                        .find(|(from, _)| from == pk)
                        .map(|(from, to)| (from.to_string(), to.to_string()))
                })
                .collect(),
        );
    }

    let child_pk = &model.entity(child).primary_key;
    let parent_pk = &model.entity(parent).primary_key;
    (child_pk.len() == parent_pk.len())
        .then(|| child_pk.iter().cloned().zip(parent_pk.iter().cloned()).collect())
}

/// A foreign key of `child` whose columns are exactly its primary key and
/// which references exactly the primary key of `parent`.
fn inheritance_link(model: &SchemaModel, child: EntityId, parent: EntityId) -> Option<crate::model::RelationshipId> {
    let child_entity = model.entity(child);
    let parent_entity = model.entity(parent);
    let child_pk: BTreeSet<&str> = child_entity.primary_key.iter().map(String::as_str).collect();
    let parent_pk: BTreeSet<&str> = parent_entity.primary_key.iter().map(String::as_str).collect();

    model
        .outbound(child)
        .find(|r| {
            r.parent_entity == parent
                && r.from_columns.iter().map(String::as_str).collect::<BTreeSet<_>>() == child_pk
                && r.to_columns.iter().map(String::as_str).collect::<BTreeSet<_>>() == parent_pk
        })
        .map(|r| r.id)
}

/// Best-effort table-per-type detection. Returns the roots of new hierarchies.
fn detect_table_per_type(
    model: &mut SchemaModel,
    claimed: &mut BTreeMap<EntityId, InheritancePattern>,
    stats: &ImportStatistics,
) -> Vec<EntityId> {
    let mut order: Vec<EntityId> = model.entities().iter().map(|e| e.id).collect();
    order.sort_by(|a, b| model.entity(*a).name.cmp(&model.entity(*b).name));

    let mut linked = Vec::new();
    for child in order {
        if claimed.contains_key(&child) || model.entity(child).is_virtual() {
            continue;
        }
        let mut candidates: Vec<EntityId> = model
            .outbound(child)
            .map(|r| r.parent_entity)
            .filter(|parent| *parent != child)
            .filter(|parent| {
                claimed
                    .get(parent)
                    .map_or(true, |p| *p == InheritancePattern::TablePerType)
            })
            .filter(|parent| inheritance_link(model, child, *parent).is_some())
            .filter(|parent| !model.lineage(*parent).contains(&child))
            .collect();
        candidates.sort_by(|a, b| model.entity(*a).name.cmp(&model.entity(*b).name));
        candidates.dedup();

        let Some(parent) = candidates.first().copied() else {
            continue;
        };
        if candidates.len() > 1 {
            stats.warn(format!(
                "'{}' shares its primary key with several tables; treated as a subtype of '{}'",
                model.entity(child).name,
                model.entity(parent).name
            ));
        }
        if let Some(join) = table_per_type_join(model, child, parent) {
            model.entity_mut(child).parent_join = join;
            model.entity_mut(child).parent = Some(parent);
            claimed.insert(child, InheritancePattern::TablePerType);
            linked.push(child);
            debug!(
                child = %model.entity(child).name,
                parent = %model.entity(parent).name,
                "Table-per-type link detected"
            );
        }
    }

    let mut roots: Vec<EntityId> = linked.iter().map(|id| model.lineage(*id)[0]).collect();
    roots.sort();
    roots.dedup();
    for root in &roots {
        claimed.entry(*root).or_insert(InheritancePattern::TablePerType);
    }
    roots
}

fn register_bag(model: &mut SchemaModel, pending: PendingBag) {
    let mut members: Vec<(usize, EntityId)> = model
        .entities()
        .iter()
        .filter(|e| e.id == pending.root || e.parent.is_some())
        .map(|e| (model.lineage(e.id), e.id))
        .filter(|(lineage, _)| lineage[0] == pending.root)
        .map(|(lineage, id)| (lineage.len() - 1, id))
        .collect();
    if members.len() < 2 {
        return;
    }
    members.sort();

    let mut depths: BTreeMap<usize, BTreeSet<EntityId>> = BTreeMap::new();
    for (level, id) in &members {
        depths.entry(*level).or_default().insert(*id);
    }
    let bag = model.push_bag(HierarchicalBag {
        id: BagId(model.bags().len()),
        pattern: pending.pattern,
        root: pending.root,
        depths,
        discriminator: pending.discriminator,
        discriminator_values: pending.values,
    });

    // Ascending level, so a parent's attributes are settled before its children read them.
    for (level, id) in members {
        let inherited: Vec<Attribute> = match model.entity(id).parent {
            Some(parent) => model.all_attributes(parent).into_iter().cloned().collect(),
            None => Vec::new(),
        };
        let entity = model.entity_mut(id);
        entity.inheritance_level = level;
        entity.bag = Some(bag);
        entity.inherited_attributes = inherited;
    }
}

impl SchemaModel {
    pub fn pattern_of(&self, entity: EntityId) -> Option<InheritancePattern> {
        self.entity(entity).bag.map(|bag| self.bag(bag).pattern)
    }

    /// Attributes this entity adds on top of its ancestors.
    ///
    /// Inherited names shadow own columns (table-per-concrete-type tables
    /// repeat them), and a table-per-type child's key only repeats its
    /// parent's key.
    pub fn own_attributes(&self, entity: EntityId) -> Vec<&Attribute> {
        let e = self.entity(entity);
        let inherited: BTreeSet<&str> = e.inherited_attributes.iter().map(|a| a.name.as_str()).collect();
        let joined_child = e.parent.is_some() && self.pattern_of(entity) == Some(InheritancePattern::TablePerType);

        e.attributes
            .iter()
            .filter(|a| !inherited.contains(a.name.as_str()))
            .filter(|a| !(joined_child && a.from_primary_key))
            .collect()
    }

    /// Inherited attributes followed by own attributes.
    pub fn all_attributes(&self, entity: EntityId) -> Vec<&Attribute> {
        self.entity(entity)
            .inherited_attributes
            .iter()
            .chain(self.own_attributes(entity))
            .collect()
    }

    /// Each primary key column of `entity` paired with the root column it
    /// stands for. Identity except along table-per-type links.
    pub fn root_key_mapping(&self, entity: EntityId) -> Vec<(String, String)> {
        let e = self.entity(entity);
        e.primary_key
            .iter()
            .map(|own| {
                let mut column = own.clone();
                let mut current = e;
                while self.pattern_of(current.id) == Some(InheritancePattern::TablePerType) {
                    let Some(parent) = current.parent else { break };
                    if let Some((_, to)) = current.parent_join.iter().find(|(from, _)| *from == column) {
                        column = to.clone();
                    }
                    current = self.entity(parent);
                }
                (own.clone(), column)
            })
            .collect()
    }

    /// Root of the hierarchy `entity` belongs to (itself when flat).
    pub fn root_of(&self, entity: EntityId) -> EntityId {
        self.lineage(entity)[0]
    }
}
