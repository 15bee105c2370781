/// Client sessions and auto-checkout monitors.
pub mod auto_checkout;
/// Field search, submission and cached catalog views.
pub mod catalog_service;
/// Chunked id-containment lookups.
pub mod chunked_lookup;
/// Reviews, chat pointers and favorites.
pub mod community_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Player profiles.
pub mod player_service;
/// Check-in / check-out transitions.
pub mod presence_service;
/// Merge of provider drafts with stored community state.
pub mod reconciliation;
/// Friend graph operations.
pub mod social_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Optimistic multi-document transactions.
pub mod transaction;
