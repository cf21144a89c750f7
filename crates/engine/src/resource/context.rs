//! Per-request scratch state.

use std::collections::HashMap;

use crate::catalog::ColumnMap;
use crate::resource::expr::SqlFragment;
use crate::roles::Caller;

/// State for a single engine operation.
///
/// Created at the top of every public operation and dropped at its end.
/// It is deliberately not stored on the service: two in-flight requests can
/// never clobber each other's compiled fragments.
pub struct RequestState<'a> {
    /// Columns of the primary table, resolved from the catalog.
    pub columns: &'a ColumnMap,

    pub caller: Option<&'a Caller>,

    /// Active language for this request (`_lang` or the resource default).
    pub lang: String,

    /// Computed-join output name → COALESCE fragment. Registered by the
    /// projection step; the filter translator targets these afterwards.
    pub coalesce: HashMap<String, SqlFragment>,

    /// Translated field → language-coalesce fragment.
    pub lang_joins: HashMap<String, SqlFragment>,
}

impl<'a> RequestState<'a> {
    pub fn new(columns: &'a ColumnMap, caller: Option<&'a Caller>, lang: impl Into<String>) -> Self {
        Self {
            columns,
            caller,
            lang: lang.into(),
            coalesce: HashMap::new(),
            lang_joins: HashMap::new(),
        }
    }

    /// Whether the request runs in a non-default language and translation
    /// lookups apply.
    pub fn translating(&self, default_lang: &str) -> bool {
        !self.lang.is_empty() && self.lang != default_lang
    }
}
