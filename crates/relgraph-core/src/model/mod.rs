//! In-memory model of the relational source schema.
//!
//! Entities, relationships and hierarchy bags live in arenas owned by
//! [`SchemaModel`] and refer to each other through integer ids. The model is
//! produced by [`SchemaModel::load`] and then passed by value through the
//! hierarchy classification pass; nothing mutates it afterwards.

pub mod loader;

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::hierarchy::HierarchicalBag;

pub use loader::TableFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RelationshipId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BagId(pub usize);

/// A column of an entity.
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    pub name: String,
    pub ordinal: usize,
    pub source_type: String,
    pub entity: EntityId,
    pub from_primary_key: bool,
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.name == other.name
    }
}

impl Eq for Attribute {}

impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// A foreign key constraint declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_entity: String,
    pub referenced_columns: Vec<String>,
}

/// A table (or a virtual single-table subtype) of the source.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub schema: Option<String>,
    /// Physical table holding the rows; differs from `name` for single-table subtypes.
    pub table: String,
    /// Own attributes, sorted by ordinal position.
    pub attributes: Vec<Attribute>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub outbound: Vec<RelationshipId>,
    pub inbound: Vec<RelationshipId>,
    pub parent: Option<EntityId>,
    pub inheritance_level: usize,
    pub bag: Option<BagId>,
    /// Attributes of all ancestors, resolved once during classification.
    pub inherited_attributes: Vec<Attribute>,
    /// Own primary key column -> parent primary key column, for table-per-type children.
    pub parent_join: Vec<(String, String)>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Entity {}

impl Entity {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn primary_key_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.from_primary_key)
    }

    pub fn is_virtual(&self) -> bool {
        self.table != self.name
    }

    /// Columns referenced by any of this entity's foreign keys.
    pub fn foreign_key_columns(&self) -> BTreeSet<&str> {
        self.foreign_keys
            .iter()
            .flat_map(|fk| fk.columns.iter().map(String::as_str))
            .collect()
    }
}

/// One foreign key constraint seen as a directed link.
#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub id: RelationshipId,
    /// Entity holding the foreign key.
    pub foreign_entity: EntityId,
    /// Referenced entity.
    pub parent_entity: EntityId,
    /// Index into the foreign entity's `foreign_keys`.
    pub foreign_key: usize,
    /// Foreign key columns, positionally mapped onto `to_columns`.
    pub from_columns: Vec<String>,
    pub to_columns: Vec<String>,
    /// Set when the relationship links a table-per-type child to its parent.
    pub inheritance: bool,
}

impl Relationship {
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.from_columns
            .iter()
            .map(String::as_str)
            .zip(self.to_columns.iter().map(String::as_str))
    }

    fn pair_set(&self) -> BTreeSet<(&str, &str)> {
        self.column_pairs().collect()
    }
}

/// Equal when endpoints and the column mapping match, whatever the column order.
impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.foreign_entity == other.foreign_entity
            && self.parent_entity == other.parent_entity
            && self.pair_set() == other.pair_set()
    }
}

impl Eq for Relationship {}

/// The full source schema.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaModel {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    bags: Vec<HierarchicalBag>,
    #[serde(skip)]
    index: HashMap<String, EntityId>,
}

impl SchemaModel {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    /// Exact lookup first, then case-insensitive.
    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.index.get(name).map(|id| self.entity(*id)).or_else(|| {
            self.entities
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn relationship(&self, id: RelationshipId) -> &Relationship {
        &self.relationships[id.0]
    }

    pub fn outbound(&self, entity: EntityId) -> impl Iterator<Item = &Relationship> {
        self.entity(entity)
            .outbound
            .iter()
            .map(|id| self.relationship(*id))
    }

    pub fn bags(&self) -> &[HierarchicalBag] {
        &self.bags
    }

    pub fn bag(&self, id: BagId) -> &HierarchicalBag {
        &self.bags[id.0]
    }

    /// Ancestor chain of `entity`, root first, ending with `entity` itself.
    pub fn lineage(&self, entity: EntityId) -> Vec<EntityId> {
        let mut chain = vec![entity];
        let mut current = self.entity(entity).parent;
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.entity(parent).parent;
        }
        chain.reverse();
        chain
    }

    pub(crate) fn push_entity(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        entity.id = id;
        for attribute in &mut entity.attributes {
            attribute.entity = id;
        }
        self.index.insert(entity.name.clone(), id);
        self.entities.push(entity);
        id
    }

    /// Registers a relationship unless an equal one already exists.
    pub(crate) fn push_relationship(&mut self, mut relationship: Relationship) -> Option<RelationshipId> {
        if self.relationships.iter().any(|r| *r == relationship) {
            return None;
        }
        let id = RelationshipId(self.relationships.len());
        relationship.id = id;
        self.entities[relationship.foreign_entity.0].outbound.push(id);
        self.entities[relationship.parent_entity.0].inbound.push(id);
        self.relationships.push(relationship);
        Some(id)
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    pub(crate) fn relationship_mut(&mut self, id: RelationshipId) -> &mut Relationship {
        &mut self.relationships[id.0]
    }

    pub(crate) fn push_bag(&mut self, bag: HierarchicalBag) -> BagId {
        let id = BagId(self.bags.len());
        self.bags.push(bag);
        id
    }
}
