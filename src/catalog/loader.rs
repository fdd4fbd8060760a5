//! TOML catalog loader.
//!
//! ```toml
//! [[entity]]
//! name = "Computer"
//! table = "glpi_computers"
//! soft_delete = true
//! entity_scoped = true
//! default_display = [1, 3]
//!
//! [[entity.fields]]
//! id = 1
//! table = "glpi_computers"
//! column = "name"
//! label = "Name"
//! datatype = "itemlink"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::{EntityType, FieldDescriptor, JoinHop};
use super::{CatalogError, CatalogProvider, CatalogResult};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Whether `s` can be used as a bare SQL identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct CatalogFile {
    #[serde(default)]
    entity: Vec<EntityType>,
}

/// Catalog of every entity type, loaded from TOML.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: BTreeMap<String, EntityType>,
}

impl Catalog {
    pub fn from_toml_str(content: &str) -> CatalogResult<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_entities(file.entity)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_entities(entities: Vec<EntityType>) -> CatalogResult<Self> {
        let mut types = BTreeMap::new();
        for entity in entities {
            validate_entity(&entity)?;
            let name = entity.name.clone();
            if types.insert(name.clone(), entity).is_some() {
                return Err(CatalogError::DuplicateEntity(name));
            }
        }

        for entity in types.values() {
            for member in &entity.union_of {
                if !types.contains_key(member) {
                    return Err(CatalogError::UnknownUnionMember {
                        itemtype: entity.name.clone(),
                        member: member.clone(),
                    });
                }
            }
        }

        Ok(Self { types })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl CatalogProvider for Catalog {
    fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    fn entity_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }
}

fn validate_entity(entity: &EntityType) -> CatalogResult<()> {
    check_identifier(&entity.table)?;

    let mut seen = HashSet::new();
    for field in entity.fields.iter().chain(&entity.plugin_fields) {
        if !seen.insert(field.id) {
            return Err(CatalogError::DuplicateField {
                itemtype: entity.name.clone(),
                id: field.id,
            });
        }
        validate_field(field)?;
    }

    for id in entity.default_display.iter().chain(&entity.default_sort) {
        if !seen.contains(id) {
            return Err(CatalogError::UnknownField {
                itemtype: entity.name.clone(),
                id: *id,
            });
        }
    }

    for hops in entity.meta_links.values() {
        hops.iter().try_for_each(validate_hop)?;
    }
    Ok(())
}

// Join hops are checked again by the join planner; a bad hop here is a
// malformed file, not a plan-time condition.
fn validate_field(field: &FieldDescriptor) -> CatalogResult<()> {
    check_identifier(&field.table)?;
    if field.computation.is_none() {
        check_identifier(&field.column)?;
    }
    for column in field.additional_columns.iter().chain(&field.delay_column) {
        check_identifier(column)?;
    }
    Ok(())
}

fn validate_hop(hop: &JoinHop) -> CatalogResult<()> {
    check_identifier(&hop.table)?;
    for name in [&hop.linkfield, &hop.pivot, &hop.pivot_fk].into_iter().flatten() {
        check_identifier(name)?;
    }
    Ok(())
}

fn check_identifier(name: &str) -> CatalogResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier(name.to_string()))
    }
}
