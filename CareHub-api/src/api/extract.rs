use axum::extract::FromRequest;
use axum::response::sse::Event;
use serde::Serialize;

use care_hub_data::repository::Change;

use crate::api::error::ApiError;

/// JSON body whose rejections use the API error format
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Server-sent event for a subscription change
pub fn change_event<T: Serialize>(change: Change<T>) -> Result<Event, axum::Error> {
    match change {
        Change::Added(item) => Event::default().event("added").json_data(item),
        Change::Modified(item) => Event::default().event("modified").json_data(item),
        Change::Removed(id) => Ok(Event::default().event("removed").data(id)),
    }
}
