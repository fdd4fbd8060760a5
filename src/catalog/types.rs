//! Catalog data types: entity types, field descriptors and join hops.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Stable per-entity-type field identifier.
pub type FieldId = u32;

/// Value type of a field, driving comparator semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    String,
    Text,
    Email,
    Weblink,
    /// Link to the item itself (usually its name).
    Itemlink,
    /// Name column of a referenced dropdown table.
    Dropdown,
    Number,
    Integer,
    Decimal,
    Count,
    /// Duration in seconds.
    Timestamp,
    Date,
    Datetime,
    /// Date plus a month count held in another column.
    DateDelay,
    Bool,
    /// Permission bitmask.
    Right,
    /// Rendered by a registered fragment builder.
    Specific,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Number
                | DataType::Integer
                | DataType::Decimal
                | DataType::Count
                | DataType::Timestamp
        )
    }

    pub fn is_date(self) -> bool {
        matches!(self, DataType::Date | DataType::Datetime | DataType::DateDelay)
    }

    /// Whether an equality on a numeric value compares the joined row id.
    pub fn links_by_id(self) -> bool {
        matches!(self, DataType::Dropdown | DataType::Itemlink)
    }

    /// Comparators offered when a field does not list its own.
    pub fn default_search_types(self) -> Vec<Comparator> {
        use Comparator::*;
        match self {
            DataType::Dropdown => vec![Contains, NotContains, Equals, NotEquals, Under, NotUnder],
            dt if dt.is_numeric() || dt.is_date() => {
                vec![Contains, NotContains, Equals, NotEquals, LessThan, MoreThan]
            }
            _ => vec![Contains, NotContains, Equals, NotEquals],
        }
    }
}

/// Criterion comparator ("searchtype").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    #[default]
    Contains,
    NotContains,
    Equals,
    NotEquals,
    Under,
    NotUnder,
    LessThan,
    MoreThan,
}

impl Comparator {
    /// Split into the positive comparator and whether it is negated,
    /// folding in an `AND NOT` / `OR NOT` link.
    pub fn normalize(self, link_negated: bool) -> (Comparator, bool) {
        let (positive, negated) = match self {
            Comparator::NotContains => (Comparator::Contains, true),
            Comparator::NotEquals => (Comparator::Equals, true),
            Comparator::NotUnder => (Comparator::Under, true),
            other => (other, false),
        };
        (positive, negated != link_negated)
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Comparator::Contains => "contains",
            Comparator::NotContains => "notcontains",
            Comparator::Equals => "equals",
            Comparator::NotEquals => "notequals",
            Comparator::Under => "under",
            Comparator::NotUnder => "notunder",
            Comparator::LessThan => "lessthan",
            Comparator::MoreThan => "morethan",
        };
        f.write_str(name)
    }
}

/// How a hop links the reference table to the joined table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// `ref.linkfield = target.id`
    #[default]
    Standard,
    /// `target.linkfield = ref.id`
    Child,
    /// `target.items_id = ref.id AND target.itemtype = '<RefType>'`
    ItemtypeItem,
    /// `ref.items_id = target.id AND ref.itemtype = '<TargetType>'`
    ItemtypeItemRevert,
    /// Pivot table holding a foreign key to each side.
    ManyToMany,
}

impl JoinKind {
    /// Whether one reference row may match several joined rows.
    pub fn fans_out(self) -> bool {
        matches!(
            self,
            JoinKind::Child | JoinKind::ItemtypeItem | JoinKind::ManyToMany
        )
    }
}

/// One hop of a join path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinHop {
    pub table: String,
    #[serde(default)]
    pub kind: JoinKind,
    /// Link column; defaults to the conventional foreign key for the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkfield: Option<String>,
    /// Extra ON condition with `NEWTABLE` / `REFTABLE` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Item type written into polymorphic `itemtype` columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemtype: Option<String>,
    /// Pivot table of a many-to-many hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<String>,
    /// Pivot column referencing the reference table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_fk: Option<String>,
}

impl JoinHop {
    pub fn standard(table: &str) -> Self {
        Self {
            table: table.to_string(),
            kind: JoinKind::Standard,
            linkfield: None,
            condition: None,
            itemtype: None,
            pivot: None,
            pivot_fk: None,
        }
    }
}

/// Tree structure of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hierarchy {
    #[default]
    None,
    Tree { parent_column: String },
}

/// Capability tags resolved when the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Has an `is_deleted` column (trash bin).
    pub soft_delete: bool,
    /// Has an `is_template` column.
    pub template: bool,
    /// Has an `entities_id` column.
    pub entity_scoped: bool,
    /// Has an `is_recursive` column.
    pub recursive: bool,
    pub hierarchy: Hierarchy,
}

/// Describes how to locate, join and render one logical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub datatype: DataType,
    /// Hops from the base table; empty means the conventional foreign key
    /// when `table` is not the base table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub join: Vec<JoinHop>,
    #[serde(default)]
    pub force_group_by: bool,
    /// Aggregate field, filtered in HAVING on its output alias.
    #[serde(default)]
    pub use_having: bool,
    #[serde(default)]
    pub nosearch: bool,
    #[serde(default)]
    pub nodisplay: bool,
    /// Tolerance for numeric equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// SQL expression replacing the column, `TABLE` stands for the alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Entity type owning `table`, used for translations and hierarchies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_type: Option<String>,
    /// Columns of the joined row carried alongside each value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_types: Option<Vec<Comparator>>,
    /// Month count column for `date_delay` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_column: Option<String>,
}

impl FieldDescriptor {
    pub fn allowed_comparators(&self) -> Vec<Comparator> {
        self.search_types
            .clone()
            .unwrap_or_else(|| self.datatype.default_search_types())
    }

    pub fn allows(&self, comparator: Comparator) -> bool {
        self.allowed_comparators().contains(&comparator)
    }

    /// Whether the join path can return several rows per base row.
    pub fn join_fans_out(&self) -> bool {
        self.join.iter().any(|hop| hop.kind.fans_out())
    }
}

/// Entity type definition as written in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub default_display: Vec<FieldId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<FieldId>,
    /// Concrete types searched together by a virtual type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub union_of: Vec<String>,
    /// Join path from this type's table to another type's table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta_links: BTreeMap<String, Vec<JoinHop>>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_fields: Vec<FieldDescriptor>,
}
