use std::path::Path;

use anyhow::{Context, Result};

use skillbot_config::SkillBotConfig;

/// Print the skills found under the configured directory, plus any files
/// that were skipped.
pub fn list_skills(config: &SkillBotConfig, working_dir: &Path) -> Result<()> {
    let dir = config.skills_dir(working_dir);
    let snapshot = skillbot_skills::load(&dir)
        .with_context(|| format!("loading skills from {}", dir.display()))?;

    println!("{} skill(s) in {}", snapshot.count(), dir.display());
    for skill in snapshot.skills() {
        println!();
        println!("  {}", skill.name);
        if !skill.description.is_empty() {
            println!("    {}", skill.description);
        }
        println!("    triggers: {}", skill.trigger_keywords.join(", "));
        println!("    source:   {}", skill.source_path.display());
    }

    if !snapshot.warnings().is_empty() {
        println!("\n{} file(s) skipped:", snapshot.warnings().len());
        for warning in snapshot.warnings() {
            println!("  - {warning}");
        }
    }
    Ok(())
}
