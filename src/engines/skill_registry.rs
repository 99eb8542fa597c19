use crate::errors::OrchestratorResult;
use crate::types::{SkillInvocation, SkillRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Skill discovery and summary lookup.
#[async_trait]
pub trait SkillRegistryInterface: Send + Sync {
    /// Find skills whose path or summary matches the query text.
    async fn search(&self, query: &str) -> OrchestratorResult<Vec<SkillRef>>;

    /// Short textual summaries for the given skill ids. Unknown ids are
    /// simply absent from the result.
    async fn get_summaries(&self, skill_ids: &[String]) -> OrchestratorResult<HashMap<String, String>>;
}

/// Opaque executor that actually runs a skill. Production adapters wrap the
/// vendor action broker; tests substitute deterministic doubles.
#[async_trait]
pub trait SkillExecutorInterface: Send + Sync {
    async fn execute(
        &self,
        skill_id: &str,
        skill_path: &str,
        input_data: &serde_json::Value,
        context: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<SkillInvocation>;
}

struct RegisteredSkill {
    skill: SkillRef,
    summary: String,
}

/// In-memory registry over a fixed pool of skills. Search is token overlap
/// between the query and each skill's path and summary.
pub struct StaticSkillRegistry {
    skills: RwLock<Vec<RegisteredSkill>>,
}

impl StaticSkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, skill: SkillRef, summary: &str) {
        let mut skills = self.skills.write().expect("registry lock poisoned");
        skills.push(RegisteredSkill {
            skill,
            summary: summary.to_string(),
        });
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect()
    }
}

impl Default for StaticSkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SkillRegistryInterface for StaticSkillRegistry {
    async fn search(&self, query: &str) -> OrchestratorResult<Vec<SkillRef>> {
        let query_tokens = Self::tokenize(query);
        let skills = self.skills.read().expect("registry lock poisoned");

        let mut matches: Vec<(usize, SkillRef)> = skills
            .iter()
            .filter_map(|entry| {
                let haystack = format!("{} {}", entry.skill.skill_path, entry.summary);
                let skill_tokens = Self::tokenize(&haystack);
                let overlap = query_tokens
                    .iter()
                    .filter(|t| skill_tokens.contains(t))
                    .count();
                if overlap > 0 {
                    Some((overlap, entry.skill.clone()))
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches.into_iter().map(|(_, s)| s).collect())
    }

    async fn get_summaries(&self, skill_ids: &[String]) -> OrchestratorResult<HashMap<String, String>> {
        let skills = self.skills.read().expect("registry lock poisoned");
        Ok(skills
            .iter()
            .filter(|entry| skill_ids.contains(&entry.skill.id))
            .map(|entry| (entry.skill.id.clone(), entry.summary.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticSkillRegistry {
        let registry = StaticSkillRegistry::new();
        registry.register(
            SkillRef::new("skill-email", "email.gmail.draft_reply"),
            "Draft a reply email in the user's voice",
        );
        registry.register(
            SkillRef::new("skill-crm", "crm.salesforce.update_lead"),
            "Update a Salesforce lead record",
        );
        registry
    }

    #[tokio::test]
    async fn search_matches_on_path_and_summary() {
        let registry = registry();
        let hits = registry.search("draft an email reply").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "skill-email");
    }

    #[tokio::test]
    async fn search_with_no_overlap_is_empty() {
        let registry = registry();
        let hits = registry.search("forecast quarterly revenue").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn summaries_skip_unknown_ids() {
        let registry = registry();
        let summaries = registry
            .get_summaries(&["skill-crm".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries["skill-crm"].contains("Salesforce"));
    }
}
