use policy_store::{storage, PolicyManager, Settings, SqlPolicyManager};
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    manager: SqlPolicyManager,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with the schema in place
    pub async fn new() -> Self {
        Self::with_settings(Settings::default()).await
    }

    /// Same as [`TestDb::new`], with store settings supplied by the test.
    /// The database URL and engine are always overridden.
    pub async fn with_settings(mut settings: Settings) -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        settings.database.url = format!("sqlite://{}?mode=rwc", db_path);
        settings.database.engine = "sqlite".to_string();

        let connection = storage::connect(&settings)
            .await
            .expect("Failed to connect to test database");
        let manager =
            SqlPolicyManager::new(connection, &settings).expect("Failed to build policy manager");

        // Run migrations
        manager
            .initialize()
            .await
            .expect("Failed to run migrations");

        Self {
            manager,
            _temp_file: temp_file,
        }
    }

    pub fn manager(&self) -> &SqlPolicyManager {
        &self.manager
    }
}
