//! Conversions from query response shapes to domain types.

use atelier_core::{ArtworkId, PortfolioId};

use super::queries::{AssetFields, get_portfolio, list_portfolios};
use super::types::{Artwork, ArtworkMedia, Asset, Portfolio, PortfolioParent, PortfolioSummary};

// =============================================================================
// get_portfolio conversions
// =============================================================================

pub fn convert_portfolio(node: get_portfolio::PortfolioNode) -> Portfolio {
    Portfolio {
        id: PortfolioId::new(node.id),
        title: node.title,
        slug: node.slug,
        parent: node.parent.map(|p| PortfolioParent {
            id: PortfolioId::new(p.id),
            title: p.title,
            slug: p.slug,
        }),
        artworks: node.artworks.into_iter().map(convert_artwork).collect(),
    }
}

fn convert_artwork(node: get_portfolio::ArtworkNode) -> Artwork {
    Artwork {
        id: ArtworkId::new(node.id),
        title: node.title,
        slug: node.slug,
        year: node.year,
        medium: node.medium,
        media: ArtworkMedia {
            image: node.image.and_then(convert_asset),
            video: node.video.and_then(convert_asset),
            video_thumbnail: node.video_thumbnail.and_then(convert_asset),
            audio: node.audio.and_then(convert_asset),
            audio_thumbnail: node.audio_thumbnail.and_then(convert_asset),
            pdf: node.pdf.and_then(convert_asset),
            pdf_thumbnail: node.pdf_thumbnail.and_then(convert_asset),
        },
    }
}

/// Assets with an empty URL are treated as missing.
fn convert_asset(fields: AssetFields) -> Option<Asset> {
    if fields.url.trim().is_empty() {
        return None;
    }

    Some(Asset {
        url: fields.url,
        low_res_url: fields.low_res_url.filter(|u| !u.trim().is_empty()),
        mime_type: fields.mime_type,
    })
}

// =============================================================================
// list_portfolios conversions
// =============================================================================

pub fn convert_portfolio_summary(node: list_portfolios::PortfolioNode) -> PortfolioSummary {
    PortfolioSummary {
        id: PortfolioId::new(node.id),
        title: node.title,
        slug: node.slug,
        parent_slug: node.parent.map(|p| p.slug),
        artwork_count: node.artworks.len(),
    }
}
