//! Domain rules for issue intake, triage, and engagement
//!
//! Every operation takes its caller context explicitly; there is no
//! ambient session. The duplicate check fails closed: a store error is
//! surfaced as a dependency failure, never treated as "no duplicate".

use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthUser, Category, Issue, IssueFilter, IssueStatus, Location, NewIssue, ReportIssueRequest,
    Role, TransitionRequest,
};
use crate::store::IssueStore;

/// Two reports of the same category within this distance are duplicates.
pub const DEDUP_RADIUS_METERS: f64 = 1000.0;

/// Domain service for the issue subsystem
#[derive(Clone)]
pub struct IssueService {
    store: Arc<dyn IssueStore>,
    dedup_radius_meters: f64,
}

impl IssueService {
    /// Create a new issue service with the standard dedup radius
    pub fn new(store: Arc<dyn IssueStore>) -> Self {
        Self {
            store,
            dedup_radius_meters: DEDUP_RADIUS_METERS,
        }
    }

    /// Override the dedup radius; used by tests exercising the boundary
    pub fn with_radius(store: Arc<dyn IssueStore>, radius_meters: f64) -> Self {
        Self {
            store,
            dedup_radius_meters: radius_meters,
        }
    }

    /// Read-only pre-check: is there an unresolved issue of this category
    /// within the dedup radius?
    pub async fn check_duplicate(
        &self,
        category: Category,
        location: &Location,
    ) -> ApiResult<bool> {
        location.validate().map_err(ApiError::Validation)?;

        let nearby = self
            .store
            .find_unresolved_near(category, location, self.dedup_radius_meters)
            .await?;

        Ok(!nearby.is_empty())
    }

    /// Accept a citizen report unless a similar unresolved issue is nearby
    pub async fn report(
        &self,
        reporter: &AuthUser,
        request: ReportIssueRequest,
    ) -> ApiResult<Issue> {
        let category = request
            .category
            .parse::<Category>()
            .map_err(ApiError::Validation)?;

        let details = request.details.trim();
        if details.is_empty() {
            return Err(ApiError::Validation("Details must not be empty".to_string()));
        }

        if self.check_duplicate(category, &request.location).await? {
            return Err(ApiError::Conflict(
                "Similar issue already reported nearby".to_string(),
            ));
        }

        let issue = self
            .store
            .insert(NewIssue {
                category,
                details: details.to_string(),
                location: request.location,
                reported_by: reporter.id,
            })
            .await?;

        Ok(issue)
    }

    /// Fetch one issue with its comment thread
    pub async fn get(&self, id: Uuid) -> ApiResult<Issue> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Issue not found".to_string()))
    }

    /// List issues, newest first, optionally filtered by status
    pub async fn list(&self, filter: IssueFilter) -> ApiResult<Vec<Issue>> {
        Ok(self.store.list(&filter).await?)
    }

    /// Move an issue through the lifecycle. Government staff only. A
    /// resolution note travels only with the resolved state; an existing
    /// note is never cleared by later transitions.
    pub async fn transition(
        &self,
        caller: &AuthUser,
        id: Uuid,
        request: TransitionRequest,
    ) -> ApiResult<Issue> {
        require_gov(caller)?;

        let status = request
            .status
            .parse::<IssueStatus>()
            .map_err(ApiError::Validation)?;

        let note = if status.is_resolved() {
            request
                .resolution_note
                .as_deref()
                .map(str::trim)
                .filter(|note| !note.is_empty())
        } else {
            None
        };

        self.store
            .set_status(id, status, note)
            .await?
            .ok_or_else(|| ApiError::NotFound("Issue not found".to_string()))
    }

    /// Add one upvote; the store serializes concurrent increments
    pub async fn upvote(&self, id: Uuid) -> ApiResult<i64> {
        self.store
            .increment_upvotes(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Issue not found".to_string()))
    }

    /// Append a comment to the issue's ordered thread
    pub async fn add_comment(&self, id: Uuid, text: &str) -> ApiResult<Issue> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Validation(
                "Comment text must not be empty".to_string(),
            ));
        }

        self.store
            .add_comment(id, text)
            .await?
            .ok_or_else(|| ApiError::NotFound("Issue not found".to_string()))
    }

    /// Count issues grouped by status for dashboards. Government staff
    /// only. Statuses with no issues are absent from the map.
    pub async fn count_by_status(&self, caller: &AuthUser) -> ApiResult<BTreeMap<IssueStatus, i64>> {
        require_gov(caller)?;

        let counts = self.store.count_by_status().await?;
        Ok(counts.into_iter().collect())
    }
}

fn require_gov(caller: &AuthUser) -> ApiResult<()> {
    if caller.role != Role::GovEmployee {
        return Err(ApiError::Forbidden(
            "Access denied. Government employees only.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo;
    use crate::models::Comment;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::error::DatabaseError;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Store double mirroring the PostgreSQL semantics in memory. One async
    /// mutex stands in for the row-level serialization the database
    /// provides.
    #[derive(Default)]
    struct InMemoryIssueStore {
        issues: Mutex<HashMap<Uuid, Issue>>,
        geo_offline: bool,
    }

    impl InMemoryIssueStore {
        fn failing_geo() -> Self {
            Self {
                geo_offline: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl IssueStore for InMemoryIssueStore {
        async fn insert(&self, new_issue: NewIssue) -> Result<Issue, DatabaseError> {
            let now = Utc::now();
            let issue = Issue {
                id: Uuid::new_v4(),
                category: new_issue.category,
                details: new_issue.details,
                location: new_issue.location,
                status: IssueStatus::Pending,
                upvotes: 0,
                comments: Vec::new(),
                resolution_note: None,
                reported_by: new_issue.reported_by,
                created_at: now,
                updated_at: now,
            };
            self.issues.lock().await.insert(issue.id, issue.clone());
            Ok(issue)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Issue>, DatabaseError> {
            Ok(self.issues.lock().await.get(&id).cloned())
        }

        async fn list(&self, filter: &IssueFilter) -> Result<Vec<Issue>, DatabaseError> {
            let issues = self.issues.lock().await;
            let mut out: Vec<Issue> = issues
                .values()
                .filter(|issue| filter.status.is_none_or(|status| issue.status == status))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }

        async fn find_unresolved_near(
            &self,
            category: Category,
            center: &Location,
            radius_meters: f64,
        ) -> Result<Vec<Issue>, DatabaseError> {
            if self.geo_offline {
                return Err(DatabaseError::Configuration(
                    "geo index unreachable".to_string(),
                ));
            }

            let issues = self.issues.lock().await;
            Ok(issues
                .values()
                .filter(|issue| {
                    issue.category == category
                        && issue.status != IssueStatus::Resolved
                        && geo::distance_meters(center, &issue.location) <= radius_meters
                })
                .cloned()
                .collect())
        }

        async fn set_status(
            &self,
            id: Uuid,
            status: IssueStatus,
            resolution_note: Option<&str>,
        ) -> Result<Option<Issue>, DatabaseError> {
            let mut issues = self.issues.lock().await;
            Ok(issues.get_mut(&id).map(|issue| {
                issue.status = status;
                if let Some(note) = resolution_note {
                    issue.resolution_note = Some(note.to_string());
                }
                issue.updated_at = Utc::now();
                issue.clone()
            }))
        }

        async fn increment_upvotes(&self, id: Uuid) -> Result<Option<i64>, DatabaseError> {
            let mut issues = self.issues.lock().await;
            Ok(issues.get_mut(&id).map(|issue| {
                issue.upvotes += 1;
                issue.updated_at = Utc::now();
                issue.upvotes
            }))
        }

        async fn add_comment(&self, id: Uuid, text: &str) -> Result<Option<Issue>, DatabaseError> {
            let mut issues = self.issues.lock().await;
            Ok(issues.get_mut(&id).map(|issue| {
                issue.comments.push(Comment {
                    text: text.to_string(),
                    created_at: Utc::now(),
                });
                issue.updated_at = Utc::now();
                issue.clone()
            }))
        }

        async fn count_by_status(&self) -> Result<Vec<(IssueStatus, i64)>, DatabaseError> {
            let issues = self.issues.lock().await;
            let mut counts: HashMap<IssueStatus, i64> = HashMap::new();
            for issue in issues.values() {
                *counts.entry(issue.status).or_insert(0) += 1;
            }
            Ok(counts.into_iter().collect())
        }
    }

    fn citizen() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role: Role::Citizen,
        }
    }

    fn staff() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role: Role::GovEmployee,
        }
    }

    fn service() -> IssueService {
        IssueService::new(Arc::new(InMemoryIssueStore::default()))
    }

    fn report_at(category: &str, details: &str, longitude: f64, latitude: f64) -> ReportIssueRequest {
        ReportIssueRequest {
            category: category.to_string(),
            details: details.to_string(),
            location: Location::new(longitude, latitude),
        }
    }

    fn transition_to(status: &str, note: Option<&str>) -> TransitionRequest {
        TransitionRequest {
            status: status.to_string(),
            resolution_note: note.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn nearby_duplicate_is_rejected_until_the_first_is_resolved() {
        let svc = service();
        let reporter = citizen();

        let first = svc
            .report(&reporter, report_at("road", "pothole", 77.10, 28.70))
            .await
            .unwrap();
        assert_eq!(first.status, IssueStatus::Pending);
        assert_eq!(first.upvotes, 0);

        // ~60m away, same category, first still unresolved
        let err = svc
            .report(&reporter, report_at("road", "pothole", 77.1005, 28.7003))
            .await
            .unwrap_err();
        match err {
            ApiError::Conflict(message) => {
                assert_eq!(message, "Similar issue already reported nearby")
            }
            other => panic!("expected a conflict, got {other:?}"),
        }

        svc.transition(&staff(), first.id, transition_to("resolved", Some("patched")))
            .await
            .unwrap();

        // A resolved issue no longer blocks a coincident report
        svc.report(&reporter, report_at("road", "pothole", 77.1005, 28.7003))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn same_location_in_another_category_is_accepted() {
        let svc = service();
        let reporter = citizen();

        svc.report(&reporter, report_at("road", "pothole", 77.10, 28.70))
            .await
            .unwrap();
        svc.report(&reporter, report_at("water", "leaking main", 77.10, 28.70))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn every_unresolved_status_blocks_a_nearby_report() {
        for blocking_status in ["pending", "acknowledged", "in_progress"] {
            let svc = service();
            let reporter = citizen();

            let issue = svc
                .report(&reporter, report_at("sanitation", "overflowing bin", 77.20, 28.60))
                .await
                .unwrap();

            if blocking_status != "pending" {
                svc.transition(&staff(), issue.id, transition_to(blocking_status, None))
                    .await
                    .unwrap();
            }

            let result = svc
                .report(&reporter, report_at("sanitation", "still overflowing", 77.2001, 28.6001))
                .await;
            assert!(
                matches!(result, Err(ApiError::Conflict(_))),
                "{blocking_status} should block a nearby report"
            );
        }
    }

    #[tokio::test]
    async fn the_radius_boundary_is_inclusive() {
        let store = Arc::new(InMemoryIssueStore::default());
        let a = Location::new(0.0, 0.0);
        let b = Location::new(0.01, 0.0);
        let exact = geo::distance_meters(&a, &b);

        let svc = IssueService::with_radius(store, exact);
        svc.report(
            &citizen(),
            ReportIssueRequest {
                category: "water".to_string(),
                details: "burst main".to_string(),
                location: a,
            },
        )
        .await
        .unwrap();

        assert!(svc.check_duplicate(Category::Water, &b).await.unwrap());
    }

    #[tokio::test]
    async fn a_failing_geo_lookup_is_surfaced_not_swallowed() {
        let svc = IssueService::new(Arc::new(InMemoryIssueStore::failing_geo()));

        let check = svc
            .check_duplicate(Category::Road, &Location::new(77.10, 28.70))
            .await;
        assert!(matches!(check, Err(ApiError::Dependency(_))));

        // The report is rejected outright; nothing is inserted
        let report = svc
            .report(&citizen(), report_at("road", "pothole", 77.10, 28.70))
            .await;
        assert!(matches!(report, Err(ApiError::Dependency(_))));
    }

    #[tokio::test]
    async fn malformed_reports_are_rejected_before_the_store_is_touched() {
        let svc = service();
        let reporter = citizen();

        for bad in [
            report_at("graffiti", "tag on the wall", 77.10, 28.70),
            report_at("road", "   ", 77.10, 28.70),
            report_at("road", "pothole", 181.0, 28.70),
            report_at("road", "pothole", 77.10, 91.0),
        ] {
            let result = svc.report(&reporter, bad).await;
            assert!(matches!(result, Err(ApiError::Validation(_))));
        }

        assert!(svc.list(IssueFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transitions_are_gated_on_the_gov_role() {
        let svc = service();
        let reporter = citizen();

        let issue = svc
            .report(&reporter, report_at("road", "pothole", 77.10, 28.70))
            .await
            .unwrap();

        let err = svc
            .transition(&reporter, issue.id, transition_to("acknowledged", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        assert_eq!(svc.get(issue.id).await.unwrap().status, IssueStatus::Pending);

        let err = svc.count_by_status(&reporter).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn a_resolution_note_travels_only_with_the_resolved_state() {
        let svc = service();
        let issue = svc
            .report(&citizen(), report_at("electricity", "downed line", 77.10, 28.70))
            .await
            .unwrap();
        let gov = staff();

        // A note on a non-resolved target is ignored
        let issue2 = svc
            .transition(&gov, issue.id, transition_to("acknowledged", Some("too early")))
            .await
            .unwrap();
        assert_eq!(issue2.resolution_note, None);

        // Recorded when resolving
        let resolved = svc
            .transition(&gov, issue.id, transition_to("resolved", Some("fuse replaced")))
            .await
            .unwrap();
        assert_eq!(resolved.resolution_note.as_deref(), Some("fuse replaced"));

        // Leaving resolved keeps the note
        let reopened = svc
            .transition(&gov, issue.id, transition_to("in_progress", None))
            .await
            .unwrap();
        assert_eq!(reopened.status, IssueStatus::InProgress);
        assert_eq!(reopened.resolution_note.as_deref(), Some("fuse replaced"));

        // Resolving again without a note keeps the old one
        let resolved = svc
            .transition(&gov, issue.id, transition_to("resolved", None))
            .await
            .unwrap();
        assert_eq!(resolved.resolution_note.as_deref(), Some("fuse replaced"));
    }

    #[tokio::test]
    async fn unknown_statuses_and_issues_are_rejected() {
        let svc = service();
        let gov = staff();

        let issue = svc
            .report(&citizen(), report_at("other", "abandoned scooter", 77.10, 28.70))
            .await
            .unwrap();

        let err = svc
            .transition(&gov, issue.id, transition_to("closed", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = svc
            .transition(&gov, Uuid::new_v4(), transition_to("resolved", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = svc.upvote(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_upvotes_are_all_counted() {
        let svc = service();
        let issue = svc
            .report(&citizen(), report_at("road", "pothole", 77.10, 28.70))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let svc = svc.clone();
            let id = issue.id;
            handles.push(tokio::spawn(async move { svc.upvote(id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(svc.get(issue.id).await.unwrap().upvotes, 25);
    }

    #[tokio::test]
    async fn comments_append_in_order() {
        let svc = service();
        let issue = svc
            .report(&citizen(), report_at("water", "no supply since monday", 77.10, 28.70))
            .await
            .unwrap();

        for text in ["same here", "third day now", "tanker arrived"] {
            svc.add_comment(issue.id, text).await.unwrap();
        }

        let issue = svc.get(issue.id).await.unwrap();
        let texts: Vec<&str> = issue
            .comments
            .iter()
            .map(|comment| comment.text.as_str())
            .collect();
        assert_eq!(texts, ["same here", "third day now", "tanker arrived"]);

        for pair in issue.comments.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }

        let err = svc.add_comment(issue.id, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn count_by_status_omits_absent_statuses() {
        let svc = service();
        let reporter = citizen();
        let gov = staff();

        svc.report(&reporter, report_at("road", "pothole", 77.10, 28.70))
            .await
            .unwrap();
        svc.report(&reporter, report_at("water", "leak", 77.30, 28.90))
            .await
            .unwrap();
        let resolved = svc
            .report(&reporter, report_at("electricity", "downed line", 77.50, 29.10))
            .await
            .unwrap();
        svc.transition(&gov, resolved.id, transition_to("resolved", Some("line restrung")))
            .await
            .unwrap();

        let counts = svc.count_by_status(&gov).await.unwrap();
        assert_eq!(counts.get(&IssueStatus::Pending), Some(&2));
        assert_eq!(counts.get(&IssueStatus::Resolved), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[tokio::test]
    async fn listing_filters_by_status() {
        let svc = service();
        let reporter = citizen();
        let gov = staff();

        let a = svc
            .report(&reporter, report_at("road", "pothole", 77.10, 28.70))
            .await
            .unwrap();
        svc.report(&reporter, report_at("water", "leak", 77.30, 28.90))
            .await
            .unwrap();
        svc.transition(&gov, a.id, transition_to("in_progress", None))
            .await
            .unwrap();

        let in_progress = svc
            .list(IssueFilter {
                status: Some(IssueStatus::InProgress),
            })
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, a.id);

        assert_eq!(svc.list(IssueFilter::default()).await.unwrap().len(), 2);
    }
}
