use chrono::{DateTime, SecondsFormat, Utc};
use tracing::instrument;

use pulse_core::{FeedbackRecord, Insights, Rating, ReviewId, ReviewStatus, ReviewSubmission};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const SELECT_COLUMNS: &str = "SELECT id, rating, review_text, user_reply, summary, recommended_next, status, created_at
     FROM reviews";

/// Everything needed to persist one review. The id and timestamp are
/// assigned on insert.
#[derive(Clone, Debug)]
pub struct NewReview {
    pub rating: Rating,
    pub review_text: String,
    pub insights: Insights,
}

impl NewReview {
    pub fn new(submission: ReviewSubmission, insights: Insights) -> Self {
        Self {
            rating: submission.rating,
            review_text: submission.review_text,
            insights,
        }
    }
}

#[derive(Clone)]
pub struct ReviewRepo {
    db: Database,
}

impl ReviewRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a completed review and return the stored record.
    #[instrument(skip(self, review), fields(rating = %review.rating))]
    pub fn create(&self, review: NewReview) -> Result<FeedbackRecord, StoreError> {
        self.create_at(review, Utc::now())
    }

    fn create_at(
        &self,
        review: NewReview,
        created_at: DateTime<Utc>,
    ) -> Result<FeedbackRecord, StoreError> {
        let id = ReviewId::new();
        let status = ReviewStatus::Completed;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reviews (id, rating, review_text, user_reply, summary, recommended_next, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.as_str(),
                    review.rating.get(),
                    review.review_text,
                    review.insights.user_reply,
                    review.insights.summary,
                    review.insights.recommended_next,
                    status.to_string(),
                    format_timestamp(&created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(FeedbackRecord {
            id,
            rating: review.rating,
            review_text: review.review_text,
            user_reply: review.insights.user_reply,
            summary: review.insights.summary,
            recommended_next: review.insights.recommended_next,
            status,
            created_at: truncate_to_micros(created_at),
        })
    }

    /// All reviews, newest first. Ties on `created_at` fall back to id order,
    /// which is also time-ordered.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"))?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_record(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self))]
    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}

/// Fixed-width UTC timestamps so text order matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<FeedbackRecord, StoreError> {
    let rating: i64 = row_helpers::get(row, 1, "reviews", "rating")?;
    let status: String = row_helpers::get(row, 6, "reviews", "status")?;
    let created_at: String = row_helpers::get(row, 7, "reviews", "created_at")?;

    Ok(FeedbackRecord {
        id: ReviewId::from_raw(row_helpers::get::<String>(row, 0, "reviews", "id")?),
        rating: Rating::new(rating).map_err(|e| StoreError::CorruptRow {
            table: "reviews",
            column: "rating",
            detail: e.to_string(),
        })?,
        review_text: row_helpers::get(row, 2, "reviews", "review_text")?,
        user_reply: row_helpers::get(row, 3, "reviews", "user_reply")?,
        summary: row_helpers::get(row, 4, "reviews", "summary")?,
        recommended_next: row_helpers::get(row, 5, "reviews", "recommended_next")?,
        status: row_helpers::parse_enum(&status, "reviews", "status")?,
        created_at: row_helpers::parse_timestamp(&created_at, "reviews", "created_at")?,
    })
}
