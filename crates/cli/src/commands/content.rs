//! CMS content commands.

use atelier_site::cms::CmsClient;
use atelier_site::config::SiteConfig;

use super::CommandError;

/// Print every portfolio with its id, slug and artwork count.
#[allow(clippy::print_stdout)]
pub async fn list_portfolios() -> Result<(), CommandError> {
    let config = SiteConfig::from_env()?;
    let client = CmsClient::new(&config.cms);

    let portfolios = client.list_portfolios().await?;
    tracing::info!("Found {} portfolios", portfolios.len());

    for portfolio in &portfolios {
        let slug = portfolio.parent_slug.as_ref().map_or_else(
            || portfolio.slug.clone(),
            |parent| format!("{parent}/{}", portfolio.slug),
        );
        println!(
            "{:<28} {:<32} {:>4} artworks  {}",
            portfolio.id.as_str(), slug, portfolio.artwork_count, portfolio.title
        );
    }
    Ok(())
}
