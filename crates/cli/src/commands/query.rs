//! One-shot agent query from the terminal.
//!
//! Streams the agent's events to stdout the same way the WebSocket client
//! would see them: tool activity lines, then the spoken reply.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voxtask_agent::AgentEvent;
use voxtask_config::Settings;

pub async fn run(message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let state = voxtask_gateway::build_state(settings).await?;

    let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                AgentEvent::Thinking { .. } => {}
                AgentEvent::ToolUseStart { tool } => eprintln!("[tool] {tool}…"),
                AgentEvent::ToolUse { tool, input } => eprintln!("[tool] {tool}({input})"),
                AgentEvent::ToolResult { tool, result } => {
                    eprintln!("[tool] {tool} -> {}", result["message"].as_str().unwrap_or(""))
                }
                AgentEvent::Text { content } => print!("{content}"),
                AgentEvent::Done => println!(),
                AgentEvent::Error { message } => eprintln!("error: {message}"),
            }
        }
    });

    let result = state
        .agent
        .run(message, &events_tx, &CancellationToken::new())
        .await;
    drop(events_tx);
    let _ = printer.await;

    result?;
    Ok(())
}
