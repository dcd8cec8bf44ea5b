//! Issue persistence
//!
//! `IssueStore` is the port the domain service talks to; `PgIssueStore` is
//! the PostgreSQL implementation. Serialization of concurrent updates (the
//! upvote counter in particular) is delegated to the database, not to
//! application-level locks.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use common::error::{DatabaseError, DatabaseResult};

use crate::geo;
use crate::models::{Category, Comment, Issue, IssueFilter, IssueStatus, Location, NewIssue};

/// Persistence port for issues
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Insert a new issue with status `pending` and no engagement
    async fn insert(&self, new_issue: NewIssue) -> DatabaseResult<Issue>;

    /// Fetch one issue with its comment thread
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Issue>>;

    /// List issues, newest first, optionally filtered by status
    async fn list(&self, filter: &IssueFilter) -> DatabaseResult<Vec<Issue>>;

    /// All unresolved issues of `category` within `radius_meters` of
    /// `center`, inclusive at the boundary. Comment threads are not loaded.
    async fn find_unresolved_near(
        &self,
        category: Category,
        center: &Location,
        radius_meters: f64,
    ) -> DatabaseResult<Vec<Issue>>;

    /// Set the status. A `Some` note overwrites the stored note; `None`
    /// leaves any existing note untouched.
    async fn set_status(
        &self,
        id: Uuid,
        status: IssueStatus,
        resolution_note: Option<&str>,
    ) -> DatabaseResult<Option<Issue>>;

    /// Atomically add one upvote, returning the new count
    async fn increment_upvotes(&self, id: Uuid) -> DatabaseResult<Option<i64>>;

    /// Append a comment with a server-assigned timestamp
    async fn add_comment(&self, id: Uuid, text: &str) -> DatabaseResult<Option<Issue>>;

    /// Count issues grouped by status; absent statuses are omitted
    async fn count_by_status(&self) -> DatabaseResult<Vec<(IssueStatus, i64)>>;
}

/// PostgreSQL-backed issue store
#[derive(Clone)]
pub struct PgIssueStore {
    pool: PgPool,
}

impl PgIssueStore {
    /// Create a new issue store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn comments_for(&self, issue_id: Uuid) -> DatabaseResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT text, created_at
            FROM issue_comments
            WHERE issue_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(rows
            .into_iter()
            .map(|row| Comment {
                text: row.get("text"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn with_comments(&self, row: &PgRow) -> DatabaseResult<Issue> {
        let mut issue = issue_from_row(row)?;
        issue.comments = self.comments_for(issue.id).await?;
        Ok(issue)
    }

    /// Attach comment threads to a batch of issues with one query
    async fn attach_comments(&self, issues: &mut [Issue]) -> DatabaseResult<()> {
        if issues.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = issues.iter().map(|issue| issue.id).collect();
        let rows = sqlx::query(
            r#"
            SELECT issue_id, text, created_at
            FROM issue_comments
            WHERE issue_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        let mut grouped: HashMap<Uuid, Vec<Comment>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.get("issue_id"))
                .or_default()
                .push(Comment {
                    text: row.get("text"),
                    created_at: row.get("created_at"),
                });
        }

        for issue in issues.iter_mut() {
            if let Some(comments) = grouped.remove(&issue.id) {
                issue.comments = comments;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl IssueStore for PgIssueStore {
    async fn insert(&self, new_issue: NewIssue) -> DatabaseResult<Issue> {
        let row = sqlx::query(
            r#"
            INSERT INTO issues (category, details, longitude, latitude, reported_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, category, details, longitude, latitude, status, upvotes,
                      resolution_note, reported_by, created_at, updated_at
            "#,
        )
        .bind(new_issue.category.as_str())
        .bind(&new_issue.details)
        .bind(new_issue.location.longitude)
        .bind(new_issue.location.latitude)
        .bind(new_issue.reported_by)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        issue_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Issue>> {
        let row = sqlx::query(
            r#"
            SELECT id, category, details, longitude, latitude, status, upvotes,
                   resolution_note, reported_by, created_at, updated_at
            FROM issues
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        match row {
            Some(row) => Ok(Some(self.with_comments(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &IssueFilter) -> DatabaseResult<Vec<Issue>> {
        let rows = sqlx::query(
            r#"
            SELECT id, category, details, longitude, latitude, status, upvotes,
                   resolution_note, reported_by, created_at, updated_at
            FROM issues
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        let mut issues = rows
            .iter()
            .map(issue_from_row)
            .collect::<DatabaseResult<Vec<Issue>>>()?;

        self.attach_comments(&mut issues).await?;

        Ok(issues)
    }

    async fn find_unresolved_near(
        &self,
        category: Category,
        center: &Location,
        radius_meters: f64,
    ) -> DatabaseResult<Vec<Issue>> {
        let bbox = geo::bounding_box(center, radius_meters);

        let rows = sqlx::query(
            r#"
            SELECT id, category, details, longitude, latitude, status, upvotes,
                   resolution_note, reported_by, created_at, updated_at
            FROM issues
            WHERE category = $1
              AND status <> 'resolved'
              AND latitude BETWEEN $2 AND $3
              AND longitude BETWEEN $4 AND $5
            "#,
        )
        .bind(category.as_str())
        .bind(bbox.min_latitude)
        .bind(bbox.max_latitude)
        .bind(bbox.min_longitude)
        .bind(bbox.max_longitude)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        // The box over-covers; the exact distance decides, inclusive
        let mut issues = Vec::new();
        for row in &rows {
            let issue = issue_from_row(row)?;
            if geo::distance_meters(center, &issue.location) <= radius_meters {
                issues.push(issue);
            }
        }

        Ok(issues)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: IssueStatus,
        resolution_note: Option<&str>,
    ) -> DatabaseResult<Option<Issue>> {
        let row = sqlx::query(
            r#"
            UPDATE issues
            SET status = $2,
                resolution_note = COALESCE($3, resolution_note),
                updated_at = now()
            WHERE id = $1
            RETURNING id, category, details, longitude, latitude, status, upvotes,
                      resolution_note, reported_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(resolution_note)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        match row {
            Some(row) => Ok(Some(self.with_comments(&row).await?)),
            None => Ok(None),
        }
    }

    async fn increment_upvotes(&self, id: Uuid) -> DatabaseResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            UPDATE issues
            SET upvotes = upvotes + 1, updated_at = now()
            WHERE id = $1
            RETURNING upvotes
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(row.map(|row| row.get("upvotes")))
    }

    async fn add_comment(&self, id: Uuid, text: &str) -> DatabaseResult<Option<Issue>> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::Connection)?;

        // Touch the issue first so an unknown id is a clean miss rather
        // than a foreign key violation
        let exists = sqlx::query(
            r#"
            UPDATE issues SET updated_at = now() WHERE id = $1 RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::Query)?;

        if exists.is_none() {
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO issue_comments (issue_id, text) VALUES ($1, $2)
            "#,
        )
        .bind(id)
        .bind(text)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::Query)?;

        tx.commit().await.map_err(DatabaseError::Query)?;

        self.find_by_id(id).await
    }

    async fn count_by_status(&self) -> DatabaseResult<Vec<(IssueStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM issues
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                let status = status
                    .parse::<IssueStatus>()
                    .map_err(DatabaseError::Decode)?;
                Ok((status, row.get("count")))
            })
            .collect()
    }
}

fn issue_from_row(row: &PgRow) -> DatabaseResult<Issue> {
    let category: String = row.get("category");
    let category = category.parse::<Category>().map_err(DatabaseError::Decode)?;

    let status: String = row.get("status");
    let status = status.parse::<IssueStatus>().map_err(DatabaseError::Decode)?;

    Ok(Issue {
        id: row.get("id"),
        category,
        details: row.get("details"),
        location: Location::new(row.get("longitude"), row.get("latitude")),
        status,
        upvotes: row.get("upvotes"),
        comments: Vec::new(),
        resolution_note: row.get("resolution_note"),
        reported_by: row.get("reported_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
