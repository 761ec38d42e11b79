//! Query parameters for the studies search endpoint.

/// Fields requested from the registry (lighter payload than the full record).
pub const STUDY_FIELDS: &[&str] = &[
    "NCTId",
    "BriefTitle",
    "OverallStatus",
    "StudyType",
    "Phase",
    "StudyFirstSubmitDate",
    "HasResults",
    "ProtocolSection",
    "StatusModule",
];

/// Sort order: most recently updated first.
pub const DEFAULT_SORT: &str = "LastUpdatePostDate:desc";

/// Upper date bound meaning "no upper bound".
pub const OPEN_END_DATE: &str = "MAX";

/// Search parameters shared by every page request of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyQuery {
    page_size: u32,
    start_date: String,
    end_date: String,
}

impl StudyQuery {
    /// Creates a query for interventional phase 2/3 studies first submitted
    /// within `start_date..=end_date`.
    #[must_use]
    pub fn new(page_size: u32, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            page_size,
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }

    /// Returns the configured page size.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Builds the `filter.advanced` expression.
    #[must_use]
    pub fn advanced_filter(&self) -> String {
        format!(
            "(AREA[StudyType]INTERVENTIONAL) \
             AND (AREA[Phase](PHASE2 OR PHASE3)) \
             AND AREA[StudyFirstSubmitDate]RANGE[{},{}]",
            self.start_date, self.end_date
        )
    }

    /// Returns the ordered query pairs for one request.
    ///
    /// `page_token` is appended only when continuing a previous page.
    #[must_use]
    pub fn params(&self, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("pageSize", self.page_size.to_string()),
            ("fields", STUDY_FIELDS.join(",")),
            ("countTotal", "true".to_string()),
            ("sort", DEFAULT_SORT.to_string()),
            ("filter.advanced", self.advanced_filter()),
        ];
        if let Some(token) = page_token.filter(|token| !token.is_empty()) {
            params.push(("pageToken", token.to_string()));
        }
        params
    }
}
