use crate::engines::autonomy::AutonomyInterface;
use crate::types::ExecutionStep;
use std::collections::HashSet;
use std::sync::Arc;

/// Delegate returned when no candidates are available.
pub const DEFAULT_AGENT: &str = "operator";

/// A candidate delegate for a step, with the skill keywords it is known for.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub agent_id: String,
    pub skill_keywords: Vec<String>,
}

impl AgentProfile {
    pub fn new(agent_id: &str, skill_keywords: &[&str]) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            skill_keywords: skill_keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// Scores candidate agents for a step by skill-path keyword affinity plus
/// historical trust. A heuristic, not a correctness-critical path.
pub struct AgentSelector {
    autonomy: Arc<dyn AutonomyInterface>,
}

impl AgentSelector {
    pub fn new(autonomy: Arc<dyn AutonomyInterface>) -> Self {
        Self { autonomy }
    }

    /// Pick a delegate for the step. Highest combined score wins; ties go to
    /// the earliest candidate in input order.
    pub async fn select_agent_for_step(
        &self,
        user_id: &str,
        step: &ExecutionStep,
        available_agents: &[AgentProfile],
    ) -> String {
        if available_agents.is_empty() {
            return DEFAULT_AGENT.to_string();
        }

        let path_tokens = tokenize(&step.skill_path);
        let mut best: Option<(&AgentProfile, f64)> = None;

        for agent in available_agents {
            let affinity = agent
                .skill_keywords
                .iter()
                .filter(|k| path_tokens.contains(k.as_str()))
                .count() as f64;

            let trust = match self
                .autonomy
                .get_trust_history(user_id, &agent.agent_id)
                .await
            {
                Ok(Some(history)) => history.success_rate(),
                // No record, or the trust store is unreachable: score neutral.
                Ok(None) => 0.5,
                Err(e) => {
                    tracing::warn!(agent_id = %agent.agent_id, error = %e, "trust lookup failed");
                    0.5
                }
            };

            let score = affinity + trust;
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((agent, score)),
            }
        }

        match best {
            Some((agent, _)) => agent.agent_id.clone(),
            None => DEFAULT_AGENT.to_string(),
        }
    }
}

fn tokenize(skill_path: &str) -> HashSet<String> {
    skill_path
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OrchestratorResult;
    use crate::types::{RiskLevel, TrustHistory};
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FixedTrust {
        histories: HashMap<String, TrustHistory>,
    }

    impl FixedTrust {
        fn with(pairs: Vec<(&str, u32, u32)>) -> Self {
            Self {
                histories: pairs
                    .into_iter()
                    .map(|(agent, ok, bad)| {
                        (
                            agent.to_string(),
                            TrustHistory {
                                successful_executions: ok,
                                failed_executions: bad,
                            },
                        )
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl AutonomyInterface for FixedTrust {
        async fn should_request_approval(
            &self,
            _user_id: &str,
            _step: &ExecutionStep,
            _plan_risk: RiskLevel,
        ) -> OrchestratorResult<bool> {
            Ok(false)
        }

        async fn record_execution_outcome(
            &self,
            _user_id: &str,
            _skill_id: &str,
            _success: bool,
        ) -> OrchestratorResult<()> {
            Ok(())
        }

        async fn get_trust_history(
            &self,
            _user_id: &str,
            skill_id: &str,
        ) -> OrchestratorResult<Option<TrustHistory>> {
            Ok(self.histories.get(skill_id).cloned())
        }
    }

    fn step(skill_path: &str) -> ExecutionStep {
        ExecutionStep::new(1, "skill", skill_path)
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_the_default() {
        let selector = AgentSelector::new(Arc::new(FixedTrust::default()));
        let agent = selector
            .select_agent_for_step("u", &step("email.gmail.draft"), &[])
            .await;
        assert_eq!(agent, DEFAULT_AGENT);
    }

    #[tokio::test]
    async fn keyword_affinity_outweighs_neutral_trust() {
        let selector = AgentSelector::new(Arc::new(FixedTrust::default()));
        let agents = vec![
            AgentProfile::new("billing-bot", &["invoice", "billing"]),
            AgentProfile::new("mail-bot", &["email", "gmail"]),
        ];
        let agent = selector
            .select_agent_for_step("u", &step("email.gmail.draft_reply"), &agents)
            .await;
        assert_eq!(agent, "mail-bot");
    }

    #[tokio::test]
    async fn trust_breaks_an_affinity_tie() {
        let trust = FixedTrust::with(vec![("reliable", 9, 1), ("flaky", 1, 9)]);
        let selector = AgentSelector::new(Arc::new(trust));
        let agents = vec![
            AgentProfile::new("flaky", &["crm"]),
            AgentProfile::new("reliable", &["crm"]),
        ];
        let agent = selector
            .select_agent_for_step("u", &step("crm.salesforce.update"), &agents)
            .await;
        assert_eq!(agent, "reliable");
    }

    #[tokio::test]
    async fn exact_tie_goes_to_the_first_candidate() {
        let selector = AgentSelector::new(Arc::new(FixedTrust::default()));
        let agents = vec![
            AgentProfile::new("first", &["crm"]),
            AgentProfile::new("second", &["crm"]),
        ];
        let agent = selector
            .select_agent_for_step("u", &step("crm.hubspot.sync"), &agents)
            .await;
        assert_eq!(agent, "first");
    }
}
