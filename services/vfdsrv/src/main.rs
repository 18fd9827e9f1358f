use dotenv::dotenv;
use tracing::info;

use vfdsrv::config::{self, GatewaySettings};
use vfdsrv::{logging, profile, Gateway, Result};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _log_guard = logging::init_from_env()?;

    let settings = GatewaySettings::from_env();
    info!("vfdsrv starting");

    // Both documents are required; startup is the only place the gateway
    // gives up.
    let profiles = profile::load_catalog(&settings.profile_catalog)?;
    let site = config::load_site_config(&settings.site_config)?;
    info!(
        "loaded site {} with {} drives, {} drive profiles",
        site.site_name,
        site.drives.len(),
        profiles.len()
    );

    let gateway = Gateway::new(site, profiles, settings.state_paths()).await?;
    gateway.start();
    info!("VFD gateway running for site {}", gateway.site().site_name);

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    Ok(())
}
