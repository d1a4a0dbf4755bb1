//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::notify::StatusEvent;
use crate::web::{auth, chat, resume};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::token_handler,
        resume::upload_handler,
        resume::status_handler,
        resume::stream_handler,
        chat::completions_handler,
        chat::resume_chats_handler,
        chat::history_handler,
    ),
    components(
        schemas(
            auth::RegisterRequest,
            auth::TokenRequest,
            auth::UserResponse,
            auth::TokenResponse,
            resume::ResumeUploadResponse,
            resume::ResumeStatusResponse,
            StatusEvent,
            chat::ChatRequest,
            chat::ChatMessage,
            chat::ChatResponse,
            chat::ResumeChatSummary,
            chat::ChatHistoryResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration and bearer tokens."),
        (name = "resume", description = "Résumé upload and parsing status."),
        (name = "chat", description = "Conversations about a parsed résumé.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/register",
            "/auth/token",
            "/resume/upload",
            "/resume/status/{id}",
            "/resume/stream/{id}",
            "/chat/completions",
            "/chat/resume-chats",
            "/chat/history/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing from OpenAPI");
        }
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer")));
    }
}
