use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Pitchside Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::fields::search_fields,
        crate::routes::fields::nearby_fields,
        crate::routes::fields::submit_field,
        crate::routes::fields::get_field,
        crate::routes::fields::review_field,
        crate::routes::fields::post_chat_pointer,
        crate::routes::fields::recent_chats,
        crate::routes::presence::check_in,
        crate::routes::presence::check_out,
        crate::routes::players::upsert_player,
        crate::routes::players::get_player,
        crate::routes::players::toggle_favorite,
        crate::routes::players::list_favorites,
        crate::routes::players::list_friends,
        crate::routes::players::list_friend_requests,
        crate::routes::players::request_friend,
        crate::routes::players::accept_friend,
        crate::routes::players::decline_friend,
        crate::routes::players::remove_friend,
        crate::routes::sessions::open_session,
        crate::routes::sessions::close_session,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::ServiceStatus,
            crate::dto::health::StorageHealth,
            crate::dto::field::FieldView,
            crate::dto::field::SearchFieldsRequest,
            crate::dto::field::SearchFieldsResponse,
            crate::dto::field::SubmitFieldRequest,
            crate::dto::field::ReviewRequest,
            crate::dto::field::ChatPointerRequest,
            crate::dto::player::PlayerView,
            crate::dto::player::PlayerSummary,
            crate::dto::player::UpsertPlayerRequest,
            crate::dto::player::FavoriteToggleResponse,
            crate::dto::player::FriendshipResponse,
            crate::dto::presence::PresenceRequest,
            crate::dto::presence::CheckInResponse,
            crate::dto::presence::CheckOutResponse,
            crate::dto::session::OpenSessionRequest,
            crate::dto::session::SessionResponse,
            crate::dto::sse::FieldUpdatedEvent,
            crate::dto::sse::PlayerUpdatedEvent,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::StreamLagged,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "fields", description = "Field catalog, reviews and chat pointers"),
        (name = "presence", description = "Check-in and check-out"),
        (name = "players", description = "Profiles, favorites and friends"),
        (name = "sessions", description = "Client sessions driving auto-checkout"),
    )
)]
pub struct ApiDoc;
