use chatty_core::chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use chatty_core::Agent;

use super::{is_unique_violation, AgentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgentRepository {
    pool: DbPool,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                description,
                model,
                instructions,
                openai_assistant_id,
                slug,
                is_active,
                files_json,
                last_updated
             FROM agent
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(agent_from_row).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                description,
                model,
                instructions,
                openai_assistant_id,
                slug,
                is_active,
                files_json,
                last_updated
             FROM agent
             WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(agent_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                name,
                description,
                model,
                instructions,
                openai_assistant_id,
                slug,
                is_active,
                files_json,
                last_updated
             FROM agent
             ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(agent_from_row).collect()
    }

    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent (
                id,
                name,
                description,
                model,
                instructions,
                openai_assistant_id,
                slug,
                is_active,
                files_json,
                last_updated
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(agent.description.as_deref())
        .bind(&agent.model)
        .bind(agent.instructions.as_deref())
        .bind(agent.openai_assistant_id.as_deref())
        .bind(&agent.slug)
        .bind(agent.is_active)
        .bind(encode_files(agent)?)
        .bind(agent.last_updated.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                RepositoryError::Conflict(format!("agent slug `{}` is already in use", agent.slug))
            } else {
                RepositoryError::Database(error)
            }
        })?;

        Ok(())
    }

    async fn update(&self, agent: &Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE agent SET
                name = ?,
                description = ?,
                model = ?,
                instructions = ?,
                openai_assistant_id = ?,
                slug = ?,
                is_active = ?,
                files_json = ?,
                last_updated = ?
             WHERE id = ?",
        )
        .bind(&agent.name)
        .bind(agent.description.as_deref())
        .bind(&agent.model)
        .bind(agent.instructions.as_deref())
        .bind(agent.openai_assistant_id.as_deref())
        .bind(&agent.slug)
        .bind(agent.is_active)
        .bind(encode_files(agent)?)
        .bind(agent.last_updated.to_rfc3339())
        .bind(&agent.id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                RepositoryError::Conflict(format!("agent slug `{}` is already in use", agent.slug))
            } else {
                RepositoryError::Database(error)
            }
        })?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM agent WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn agent_from_row(row: SqliteRow) -> Result<Agent, RepositoryError> {
    let files_json = row.try_get::<String, _>("files_json")?;
    let files: Vec<String> = serde_json::from_str(&files_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid file list in `files_json`: {error}"))
    })?;

    Ok(Agent {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        model: row.try_get("model")?,
        instructions: row.try_get("instructions")?,
        openai_assistant_id: row.try_get("openai_assistant_id")?,
        slug: row.try_get("slug")?,
        is_active: row.try_get("is_active")?,
        files,
        last_updated: parse_timestamp("last_updated", row.try_get("last_updated")?)?,
    })
}

fn encode_files(agent: &Agent) -> Result<String, RepositoryError> {
    serde_json::to_string(&agent.files).map_err(|error| {
        RepositoryError::Decode(format!("could not encode file list for `{}`: {error}", agent.id))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use chatty_core::{Agent, AgentUpdate, NewAgent};

    use super::SqlAgentRepository;
    use crate::migrations;
    use crate::repositories::{AgentRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_agent_repo_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlAgentRepository::new(pool.clone());

        let agent = Agent::create(NewAgent {
            name: "Onboarding Bot".to_string(),
            description: Some("Walks new customers through setup".to_string()),
            instructions: Some("Be concise.".to_string()),
            slug: "onboarding".to_string(),
            files: Some(vec!["setup-guide.pdf".to_string()]),
            ..NewAgent::default()
        });

        repo.insert(&agent).await.expect("insert agent");

        let by_id = repo.find_by_id(&agent.id).await.expect("find by id");
        assert_eq!(by_id, Some(agent.clone()));

        let by_slug = repo.find_by_slug("onboarding").await.expect("find by slug");
        assert_eq!(by_slug, Some(agent.clone()));

        let all = repo.list_all().await.expect("list agents");
        assert!(all.contains(&agent));

        let mut updated = agent.clone();
        updated.apply(AgentUpdate {
            name: Some("Support Agent".to_string()),
            is_active: Some(false),
            ..AgentUpdate::default()
        });
        repo.update(&updated).await.expect("update agent");

        let found = repo.find_by_id(&agent.id).await.expect("find updated");
        assert_eq!(found, Some(updated));

        let deleted = repo.delete(&agent.id).await.expect("delete agent");
        assert!(deleted);
        let gone = repo.find_by_id(&agent.id).await.expect("find deleted");
        assert_eq!(gone, None);
        let missing = repo.delete(&agent.id).await.expect("delete again");
        assert!(!missing);

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_agent_repo_rejects_duplicate_slug() {
        let pool = setup_pool().await;
        let repo = SqlAgentRepository::new(pool.clone());

        let first = Agent::create(NewAgent {
            name: "Sales Bot".to_string(),
            slug: "sales".to_string(),
            ..NewAgent::default()
        });
        let second = Agent::create(NewAgent {
            name: "Another Sales Bot".to_string(),
            slug: "sales".to_string(),
            ..NewAgent::default()
        });

        repo.insert(&first).await.expect("insert first agent");
        let error = repo.insert(&second).await.expect_err("dup slug should be rejected");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
