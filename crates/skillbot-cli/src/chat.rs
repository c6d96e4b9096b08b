use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use skillbot_config::SkillBotConfig;
use skillbot_types::AuthContext;

/// Run the interactive chat REPL.
///
/// Each line is a fresh agent invocation; Ctrl+C cancels the one in flight.
pub async fn run_chat(config: SkillBotConfig, working_dir: &Path) -> Result<()> {
    let agent = skillbot_gateway::build_agent(&config, working_dir)?;
    let auth = AuthContext::local("local");

    println!(
        "skillbot chat (agent: {}, model: {}, skills: {})",
        agent.name(),
        agent.model().id(),
        agent.skills().count()
    );
    println!("Type your message and press Enter. Type 'exit' or Ctrl+D to quit.\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let bytes = stdin.lock().read_line(&mut line)?;
        if bytes == 0 {
            // EOF (Ctrl+D)
            println!();
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        match agent.call(input, &auth, &cancel).await {
            Ok(outcome) => {
                if !outcome.skills_injected.is_empty() {
                    eprintln!("[skills: {}]", outcome.skills_injected.join(", "));
                }
                println!("{}\n", outcome.answer);
            }
            Err(e) => eprintln!("\n[agent error ({}): {e}]", e.kind()),
        }
        ctrl_c.abort();
    }

    println!("Goodbye!");
    Ok(())
}
