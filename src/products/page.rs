use serde::Serialize;

use super::api::{PageQuery, Product};

pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum LoadState {
    Idle,
    Loading,
    Complete,
    Failed(String),
}

/// The visible result set for the current query.
///
/// Every query gets a new generation. Writes carry the generation they were
/// produced for and are dropped unless it is still the current one, so a
/// superseded stream can never touch a newer page.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    #[serde(skip)]
    generation: Generation,
    #[serde(skip)]
    query: PageQuery,
    pub records: Vec<Product>,
    pub total_items: u64,
    pub load_state: LoadState,
    pub skipped_lines: usize,
}

impl Default for ResultPage {
    fn default() -> Self {
        Self::new(PageQuery::new(1, crate::config::DEFAULT_PAGE_SIZE))
    }
}

impl ResultPage {
    pub fn new(query: PageQuery) -> Self {
        Self {
            generation: 0,
            query,
            records: Vec::new(),
            total_items: 0,
            load_state: LoadState::Idle,
            skipped_lines: 0,
        }
    }

    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    /// Start a new query: drop every record of the previous one.
    ///
    /// `total_items` is kept until the new response reports its own count.
    pub fn begin(&mut self, query: PageQuery) -> Generation {
        self.generation += 1;
        self.query = query;
        self.records.clear();
        self.skipped_lines = 0;
        self.load_state = LoadState::Loading;
        self.generation
    }

    pub fn set_total(&mut self, generation: Generation, total: Option<u64>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if let Some(total) = total {
            self.total_items = total;
        }
        true
    }

    pub fn push(&mut self, generation: Generation, record: Product) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn skip_line(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.skipped_lines += 1;
        true
    }

    pub fn finish(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.load_state = LoadState::Complete;
        true
    }

    pub fn fail(&mut self, generation: Generation, reason: String) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.load_state = LoadState::Failed(reason);
        true
    }

    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(u64::from(self.query.limit.max(1)))
    }

    pub fn start_item(&self) -> u64 {
        u64::from(self.query.page.saturating_sub(1)) * u64::from(self.query.limit) + 1
    }

    pub fn end_item(&self) -> u64 {
        (u64::from(self.query.page) * u64::from(self.query.limit)).min(self.total_items)
    }

    pub fn has_prev(&self) -> bool {
        self.query.page > 1
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.query.page) < self.total_pages()
    }

    /// Flip one record's `active` flag in place. Nothing else changes.
    pub fn patch_active(&mut self, id: i64, active: bool) -> bool {
        match self.records.iter_mut().find(|p| p.id == id) {
            Some(record) => {
                record.active = active;
                true
            }
            None => false,
        }
    }
}
