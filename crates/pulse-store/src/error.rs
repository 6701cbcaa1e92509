#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_row_display_names_location() {
        let err = StoreError::CorruptRow {
            table: "reviews",
            column: "status",
            detail: "unknown variant: pending".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt row in reviews.status: unknown variant: pending"
        );
    }

    #[test]
    fn from_rusqlite() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
