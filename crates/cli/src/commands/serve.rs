//! Start the gateway server.

use voxtask_config::Settings;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env()?;
    if let Some(port) = port {
        settings.port = port;
    }
    voxtask_gateway::serve(settings).await?;
    Ok(())
}
