use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use care_hub_data::PageRequest;

/// Query parameters for cursor-paginated lists
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Number of results to return (default: 20, max: 100)
    #[param(minimum = 1, maximum = 100)]
    pub limit: Option<usize>,

    /// `next_cursor` of the previous page
    pub cursor: Option<String>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest {
            page_size: params.limit,
            cursor: params.cursor,
        }
    }
}

/// Query parameter bounding a plain list
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LimitParams {
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl LimitParams {
    /// The requested limit, or `default`, capped at `max`
    pub fn resolve(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_become_page_request() {
        let request: PageRequest = PageParams {
            limit: Some(500),
            cursor: Some("abc".into()),
        }
        .into();
        assert_eq!(request.size(), 100);
        assert_eq!(request.cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_limit_resolution() {
        assert_eq!(LimitParams::default().resolve(10, 50), 10);
        assert_eq!(LimitParams { limit: Some(0) }.resolve(10, 50), 1);
        assert_eq!(LimitParams { limit: Some(80) }.resolve(10, 50), 50);
    }
}
