use crate::catalog::Catalog;
use crate::model::{Entry, EntryId};
use nucleo_matcher::pattern::{Atom, AtomKind, CaseMatching, Normalization};
use nucleo_matcher::{Matcher, Utf32Str};

/// Case-insensitive substring filter over titles and exec lines.
pub struct LauncherFilter {
    matcher: Matcher,
    atom: Option<Atom>,
    query: String,
}

impl Default for LauncherFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LauncherFilter {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
            atom: None,
            query: String::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.atom = (!query.is_empty()).then(|| {
            Atom::new(
                query,
                CaseMatching::Ignore,
                Normalization::Smart,
                AtomKind::Substring,
                false,
            )
        });
    }

    pub fn accepts(&mut self, entry: &Entry) -> bool {
        let Some(atom) = &self.atom else {
            return true;
        };

        let mut buf = Vec::new();
        [entry.title(), entry.exec().to_string()].iter().any(|haystack| {
            atom.score(Utf32Str::new(haystack, &mut buf), &mut self.matcher)
                .is_some()
        })
    }

    /// Matching entries in catalog order.
    pub fn filter(&mut self, catalog: &Catalog) -> Vec<EntryId> {
        catalog
            .iter()
            .filter(|(_, entry)| self.accepts(entry))
            .map(|(id, _)| id)
            .collect()
    }
}
