//! Caller-facing search request and criteria tree.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::catalog::{Comparator, FieldId};
use crate::sql::SortDir;

/// A search over one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub itemtype: String,
    /// Displayed columns; the entity type's defaults when empty.
    #[serde(default)]
    pub columns: Vec<FieldId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<FieldId>,
    #[serde(default)]
    pub order: SortDir,
    #[serde(default)]
    pub start: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    /// Search the trash bin instead of live items.
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    /// Columns always displayed, whatever `columns` says.
    #[serde(default)]
    pub force_display: Vec<FieldId>,
    /// Return every row instead of one page.
    #[serde(default)]
    pub export_all: bool,
    /// Include plugin-contributed fields.
    #[serde(default)]
    pub with_plugins: bool,
    /// Reference time for relative dates; the local clock when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<NaiveDateTime>,
}

impl SearchRequest {
    pub fn new(itemtype: &str) -> Self {
        Self {
            itemtype: itemtype.to_string(),
            columns: Vec::new(),
            sort: None,
            order: SortDir::Asc,
            start: 0,
            page_size: None,
            is_deleted: false,
            criteria: Vec::new(),
            force_display: Vec::new(),
            export_all: false,
            with_plugins: false,
            now: None,
        }
    }

    pub fn columns(mut self, columns: Vec<FieldId>) -> Self {
        self.columns = columns;
        self
    }

    pub fn criteria(mut self, criteria: Vec<Criterion>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn sort(mut self, field: FieldId, order: SortDir) -> Self {
        self.sort = Some(field);
        self.order = order;
        self
    }

    pub fn page(mut self, start: u64, page_size: u64) -> Self {
        self.start = start;
        self.page_size = Some(page_size);
        self
    }

    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }
}

/// Boolean link of a criterion to its preceding sibling.
///
/// Siblings fold strictly left to right, so `a OR b AND c` means
/// `(a OR b) AND c`, not the `a OR (b AND c)` of SQL precedence. Use a
/// [`Criterion::group`] to bind differently. The link of the first
/// sibling of a list only contributes its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Link {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "AND NOT")]
    AndNot,
    #[serde(rename = "OR NOT")]
    OrNot,
}

impl Link {
    pub fn is_negated(self) -> bool {
        matches!(self, Link::AndNot | Link::OrNot)
    }

    pub fn is_or(self) -> bool {
        matches!(self, Link::Or | Link::OrNot)
    }
}

/// Pseudo-fields searching several fields at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKeyword {
    /// Every searchable field.
    All,
    /// Every displayed field.
    View,
}

/// Field a leaf criterion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRef {
    Id(FieldId),
    Keyword(FieldKeyword),
}

/// One scalar criterion value, as sent by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

/// Criterion value: a scalar or a list (any element matches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriterionValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl Default for CriterionValue {
    fn default() -> Self {
        CriterionValue::Scalar(Scalar::Text(String::new()))
    }
}

impl CriterionValue {
    /// Non-empty values as text.
    pub fn texts(&self) -> Vec<String> {
        let scalars: Vec<&Scalar> = match self {
            CriterionValue::List(items) => items.iter().collect(),
            CriterionValue::Scalar(s) => vec![s],
        };
        scalars
            .into_iter()
            .map(Scalar::as_text)
            .filter(|s| !s.trim().is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.texts().is_empty()
    }
}

impl From<&str> for CriterionValue {
    fn from(s: &str) -> Self {
        CriterionValue::Scalar(Scalar::Text(s.to_string()))
    }
}

impl From<i64> for CriterionValue {
    fn from(n: i64) -> Self {
        CriterionValue::Scalar(Scalar::Int(n))
    }
}

/// A filter on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionLeaf {
    #[serde(default)]
    pub link: Link,
    pub field: FieldRef,
    #[serde(default)]
    pub searchtype: Comparator,
    #[serde(default)]
    pub value: CriterionValue,
    /// Field belongs to `itemtype` instead of the searched type.
    #[serde(default)]
    pub meta: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemtype: Option<String>,
}

/// Node of the criteria tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criterion {
    Group {
        #[serde(default)]
        link: Link,
        criteria: Vec<Criterion>,
    },
    Leaf(CriterionLeaf),
}

impl Criterion {
    pub fn field(field: FieldId, searchtype: Comparator, value: impl Into<CriterionValue>) -> Self {
        Criterion::Leaf(CriterionLeaf {
            link: Link::And,
            field: FieldRef::Id(field),
            searchtype,
            value: value.into(),
            meta: false,
            itemtype: None,
        })
    }

    pub fn keyword(
        keyword: FieldKeyword,
        searchtype: Comparator,
        value: impl Into<CriterionValue>,
    ) -> Self {
        Criterion::Leaf(CriterionLeaf {
            link: Link::And,
            field: FieldRef::Keyword(keyword),
            searchtype,
            value: value.into(),
            meta: false,
            itemtype: None,
        })
    }

    pub fn meta(
        itemtype: &str,
        field: FieldId,
        searchtype: Comparator,
        value: impl Into<CriterionValue>,
    ) -> Self {
        Criterion::Leaf(CriterionLeaf {
            link: Link::And,
            field: FieldRef::Id(field),
            searchtype,
            value: value.into(),
            meta: true,
            itemtype: Some(itemtype.to_string()),
        })
    }

    pub fn group(link: Link, criteria: Vec<Criterion>) -> Self {
        Criterion::Group { link, criteria }
    }

    pub fn with_link(mut self, new_link: Link) -> Self {
        match &mut self {
            Criterion::Group { link, .. } => *link = new_link,
            Criterion::Leaf(leaf) => leaf.link = new_link,
        }
        self
    }

    pub fn link(&self) -> Link {
        match self {
            Criterion::Group { link, .. } => *link,
            Criterion::Leaf(leaf) => leaf.link,
        }
    }

    /// Every leaf in the subtree, depth first.
    pub fn leaves(&self) -> Vec<&CriterionLeaf> {
        match self {
            Criterion::Leaf(leaf) => vec![leaf],
            Criterion::Group { criteria, .. } => {
                criteria.iter().flat_map(Criterion::leaves).collect()
            }
        }
    }
}
