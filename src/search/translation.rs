//! Which dropdown values have translations in the active language.
//!
//! A translation join is only worth adding for `(itemtype, field)` pairs
//! that actually have rows for the active language; the index is loaded
//! once per locale by the caller and handed to the engine.

use std::collections::HashSet;

use crate::config::LocaleSettings;
use crate::sql::{col, Dialect, ExprExt, Query, TableRef};
use crate::transport::{QueryOutput, SqlTransport, TransportResult};

/// Translated `(itemtype, field)` pairs for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationIndex {
    language: String,
    table: String,
    pairs: HashSet<(String, String)>,
}

impl TranslationIndex {
    pub fn new(language: &str, table: &str) -> Self {
        Self {
            language: language.to_string(),
            table: table.to_string(),
            pairs: HashSet::new(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Table holding the translated values.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn insert(&mut self, itemtype: &str, field: &str) {
        self.pairs.insert((itemtype.to_string(), field.to_string()));
    }

    pub fn has(&self, itemtype: &str, field: &str) -> bool {
        self.pairs
            .contains(&(itemtype.to_string(), field.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn load_query(&self, dialect: Dialect) -> String {
        Query::new()
            .distinct()
            .select(vec![col("itemtype"), col("field")])
            .from(TableRef::new(&self.table))
            .filter(col("language").eq(self.language.as_str()))
            .to_sql(dialect)
    }

    /// Fill the index from the rows returned by [`Self::load_query`].
    pub fn extend_from_output(&mut self, output: &QueryOutput) {
        for row in &output.rows {
            if let (Some(Some(itemtype)), Some(Some(field))) = (row.first(), row.get(1)) {
                self.insert(itemtype, field);
            }
        }
    }

    /// Load the index for `locale` through `transport`.
    pub async fn load(
        transport: &dyn SqlTransport,
        locale: &LocaleSettings,
    ) -> TransportResult<Self> {
        let mut index = Self::new(&locale.language, &locale.translation_table);
        let output = transport
            .query(&index.load_query(transport.dialect()))
            .await?;
        index.extend_from_output(&output);
        tracing::debug!(
            language = %index.language,
            pairs = index.pairs.len(),
            "loaded translation index"
        );
        Ok(index)
    }
}
