//! GraphQL query definitions for the CMS content API.
//!
//! Each query is a unit struct implementing [`GraphQLQuery`] with its
//! variables and response shapes declared next to the document.

use graphql_client::{GraphQLQuery, QueryBody};
use serde::{Deserialize, Serialize};

/// Upper bound on artworks fetched per portfolio.
pub const MAX_ARTWORKS: i64 = 500;

/// Upper bound on portfolios listed.
pub const MAX_PORTFOLIOS: i64 = 200;

// =============================================================================
// Shared response shapes
// =============================================================================

/// Asset fields selected by every query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFields {
    pub url: String,
    /// Aliased image transform, absent for non-image assets.
    #[serde(default)]
    pub low_res_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Parent portfolio reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ParentFields {
    pub id: String,
    pub title: String,
    pub slug: String,
}

// =============================================================================
// GetPortfolio
// =============================================================================

/// Load one portfolio with every artwork and its assets.
pub struct GetPortfolio;

pub mod get_portfolio {
    use super::{AssetFields, Deserialize, ParentFields, Serialize};

    pub const OPERATION_NAME: &str = "GetPortfolio";

    pub const QUERY: &str = r"
query GetPortfolio($id: ID!, $first: Int!) {
  portfolio(where: { id: $id }) {
    id
    title
    slug
    parent { id title slug }
    artworks(first: $first) {
      id
      title
      slug
      year
      medium
      image { ...AssetFields lowResUrl: url(transformation: { image: { resize: { width: 960 } } }) }
      video { ...AssetFields }
      videoThumbnail { ...AssetFields lowResUrl: url(transformation: { image: { resize: { width: 480 } } }) }
      audio { ...AssetFields }
      audioThumbnail { ...AssetFields lowResUrl: url(transformation: { image: { resize: { width: 480 } } }) }
      pdf { ...AssetFields }
      pdfThumbnail { ...AssetFields lowResUrl: url(transformation: { image: { resize: { width: 480 } } }) }
    }
  }
}

fragment AssetFields on Asset {
  url
  mimeType
}
";

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub id: String,
        pub first: i64,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub portfolio: Option<PortfolioNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct PortfolioNode {
        pub id: String,
        pub title: String,
        pub slug: String,
        pub parent: Option<ParentFields>,
        #[serde(default)]
        pub artworks: Vec<ArtworkNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ArtworkNode {
        pub id: String,
        pub title: String,
        pub slug: String,
        pub year: Option<i32>,
        pub medium: Option<String>,
        pub image: Option<AssetFields>,
        pub video: Option<AssetFields>,
        pub video_thumbnail: Option<AssetFields>,
        pub audio: Option<AssetFields>,
        pub audio_thumbnail: Option<AssetFields>,
        pub pdf: Option<AssetFields>,
        pub pdf_thumbnail: Option<AssetFields>,
    }
}

impl GraphQLQuery for GetPortfolio {
    type Variables = get_portfolio::Variables;
    type ResponseData = get_portfolio::ResponseData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: get_portfolio::QUERY,
            operation_name: get_portfolio::OPERATION_NAME,
        }
    }
}

// =============================================================================
// ListPortfolios
// =============================================================================

/// List every portfolio with its artwork count.
pub struct ListPortfolios;

pub mod list_portfolios {
    use super::{Deserialize, Serialize};

    pub const OPERATION_NAME: &str = "ListPortfolios";

    pub const QUERY: &str = r"
query ListPortfolios($first: Int!) {
  portfolios(first: $first, orderBy: title_ASC) {
    id
    title
    slug
    parent { slug }
    artworks(first: 1000) { id }
  }
}
";

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub first: i64,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        #[serde(default)]
        pub portfolios: Vec<PortfolioNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct PortfolioNode {
        pub id: String,
        pub title: String,
        pub slug: String,
        pub parent: Option<ParentSlug>,
        #[serde(default)]
        pub artworks: Vec<ArtworkIdNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ParentSlug {
        pub slug: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ArtworkIdNode {
        pub id: String,
    }
}

impl GraphQLQuery for ListPortfolios {
    type Variables = list_portfolios::Variables;
    type ResponseData = list_portfolios::ResponseData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: list_portfolios::QUERY,
            operation_name: list_portfolios::OPERATION_NAME,
        }
    }
}
