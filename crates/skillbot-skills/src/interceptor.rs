//! Injects matched skill instructions into a conversation before each model call.

use skillbot_types::{ConversationState, Turn};

use crate::loader::{SkillRecord, SkillSnapshot};

/// Match the latest user turn (and the observations after it) against
/// `snapshot` and append guidance for every skill not injected yet.
///
/// Returns the names injected by this call, in match order.
pub fn augment(state: &mut ConversationState, snapshot: &SkillSnapshot) -> Vec<String> {
    let text = state.match_text();
    if text.is_empty() {
        return Vec::new();
    }

    let mut injected = Vec::new();
    for skill in snapshot.match_skills(&text) {
        if state.skills_injected.contains(&skill.name) {
            continue;
        }
        tracing::debug!(skill = %skill.name, "Injecting skill instructions");
        state.push(Turn::system(guidance(&skill)));
        state.skills_injected.insert(skill.name.clone());
        injected.push(skill.name.clone());
    }
    injected
}

fn guidance(skill: &SkillRecord) -> String {
    if skill.description.is_empty() {
        format!("[skill: {}]\n{}", skill.name, skill.instructions)
    } else {
        format!(
            "[skill: {}] {}\n{}",
            skill.name, skill.description, skill.instructions
        )
    }
}
