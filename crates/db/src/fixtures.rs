use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic demo agents and their verification contract.
const SEED_AGENTS: &[AgentSeedContract] = &[
    AgentSeedContract {
        agent_id: "agent-demo-support-001",
        slug: "demo-support",
        name: "Demo Support",
        model: "gpt-4o",
        is_active: true,
        file_count: 0,
        description: "Answers common product questions for the demo workspace.",
    },
    AgentSeedContract {
        agent_id: "agent-demo-sales-001",
        slug: "demo-sales",
        name: "Demo Sales Assistant",
        model: "gpt-4o-mini",
        is_active: false,
        file_count: 1,
        description: "Qualifies leads and books demo calls.",
    },
];

/// Demo seed dataset: a pair of ready-made agents so a fresh install has
/// something to render before the operator creates their own.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo agents.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo agents into the database. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let agents_seeded = SEED_AGENTS
            .iter()
            .map(|agent| AgentSeedInfo {
                slug: agent.slug,
                name: agent.name,
                description: agent.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { agents_seeded })
    }

    /// Verify that the seeded agents exist and match the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for agent in SEED_AGENTS {
            let agent_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM agent
                    WHERE id = ?1 AND slug = ?2 AND name = ?3 AND model = ?4 AND is_active = ?5
                )",
            )
            .bind(agent.agent_id)
            .bind(agent.slug)
            .bind(agent.name)
            .bind(agent.model)
            .bind(agent.is_active)
            .fetch_one(pool)
            .await?;
            checks.push((agent.slug, agent_ok == 1));

            let file_count: i64 = sqlx::query_scalar(
                "SELECT COALESCE(
                    (SELECT json_array_length(files_json) FROM agent WHERE id = ?1), -1
                )",
            )
            .bind(agent.agent_id)
            .fetch_one(pool)
            .await?;
            checks.push((agent.files_label(), file_count == agent.file_count));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct AgentSeedContract {
    agent_id: &'static str,
    slug: &'static str,
    name: &'static str,
    model: &'static str,
    is_active: bool,
    file_count: i64,
    description: &'static str,
}

impl AgentSeedContract {
    fn files_label(&self) -> &'static str {
        match self.slug {
            "demo-support" => "demo-support-files",
            _ => "demo-sales-files",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub agents_seeded: Vec<AgentSeedInfo>,
}

#[derive(Debug)]
pub struct AgentSeedInfo {
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
