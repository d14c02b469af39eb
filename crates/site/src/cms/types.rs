//! Domain types for the CMS content API.
//!
//! These types provide a clean API separate from the raw query response shapes.

use serde::{Deserialize, Serialize};

use atelier_core::{ArtworkId, ArtworkRef, PortfolioData, PortfolioId};

/// A stored file on the CMS asset CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Absolute CDN URL of the original file.
    pub url: String,
    /// Absolute CDN URL of a downscaled transform (images only).
    pub low_res_url: Option<String>,
    pub mime_type: Option<String>,
}

impl Asset {
    /// The original URL followed by the low-res transform, if any.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.low_res_url.as_deref())
    }
}

/// Every media slot an artwork can fill. Most artworks use one or two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkMedia {
    pub image: Option<Asset>,
    pub video: Option<Asset>,
    pub video_thumbnail: Option<Asset>,
    pub audio: Option<Asset>,
    pub audio_thumbnail: Option<Asset>,
    pub pdf: Option<Asset>,
    pub pdf_thumbnail: Option<Asset>,
}

impl ArtworkMedia {
    /// Assets present on the artwork, in slot order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        [
            &self.image,
            &self.video,
            &self.video_thumbnail,
            &self.audio,
            &self.audio_thumbnail,
            &self.pdf,
            &self.pdf_thumbnail,
        ]
        .into_iter()
        .flatten()
    }
}

/// A single work in a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    pub id: ArtworkId,
    pub title: String,
    pub slug: String,
    pub year: Option<i32>,
    pub medium: Option<String>,
    pub media: ArtworkMedia,
}

impl Artwork {
    /// Every asset URL the artwork references, originals and transforms.
    pub fn asset_urls(&self) -> impl Iterator<Item = &str> {
        self.media.assets().flat_map(|asset| asset.urls())
    }
}

/// Reference to a parent portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioParent {
    pub id: PortfolioId,
    pub title: String,
    pub slug: String,
}

/// A portfolio with all of its artworks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub title: String,
    pub slug: String,
    pub parent: Option<PortfolioParent>,
    pub artworks: Vec<Artwork>,
}

/// Listing entry for a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub id: PortfolioId,
    pub title: String,
    pub slug: String,
    pub parent_slug: Option<String>,
    pub artwork_count: usize,
}

impl From<&Portfolio> for PortfolioData {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            id: portfolio.id.clone(),
            title: portfolio.title.clone(),
            slug: portfolio.slug.clone(),
            artworks: portfolio
                .artworks
                .iter()
                .map(|artwork| ArtworkRef {
                    id: artwork.id.clone(),
                    title: artwork.title.clone(),
                    slug: artwork.slug.clone(),
                })
                .collect(),
        }
    }
}
