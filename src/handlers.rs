use crate::error::LedgerError;
use crate::ledger::LedgerService;
use actix_web::middleware::Logger;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

pub struct AppState {
    pub ledger: LedgerService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub voter_id: String,
    pub secret_token: String,
    pub candidate_id: String,
    pub election_id: String,
}

/// Credentials travel only in request bodies, never in the URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub voter_id: String,
    pub secret_token: String,
    pub election_id: String,
}

/// Access log line: method and path only. The query string is left out.
pub const ACCESS_LOG_FORMAT: &str = "%a \"%{method}xi %U\" %s %b %T";

pub fn access_logger() -> Logger {
    Logger::new(ACCESS_LOG_FORMAT)
        .custom_request_replace("method", |req| req.method().to_string())
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": "BadRequest", "message": message }))
}

async fn handle_vote(
    data: web::Data<AppState>,
    vote: web::Json<VoteRequest>,
) -> Result<HttpResponse, LedgerError> {
    let vote = vote.into_inner();
    if vote.election_id.is_empty() || vote.candidate_id.is_empty() {
        return Ok(bad_request("electionId and candidateId required"));
    }
    if vote.voter_id.is_empty() || vote.secret_token.is_empty() {
        return Ok(bad_request("voterId and secretToken required"));
    }

    let block_index = data
        .ledger
        .submit_vote(
            &vote.voter_id,
            &vote.secret_token,
            &vote.candidate_id,
            &vote.election_id,
        )
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Vote recorded on blockchain",
        "blockIndex": block_index,
    })))
}

async fn verify_vote(data: web::Data<AppState>, req: web::Json<VerifyRequest>) -> impl Responder {
    let receipt = data
        .ledger
        .verify(&req.voter_id, &req.secret_token, &req.election_id);
    HttpResponse::Ok().json(receipt)
}

async fn has_voted(data: web::Data<AppState>, req: web::Json<VerifyRequest>) -> impl Responder {
    let voted = data
        .ledger
        .has_voted(&req.voter_id, &req.secret_token, &req.election_id);
    HttpResponse::Ok().json(json!({ "hasVoted": voted }))
}

async fn get_tally(data: web::Data<AppState>, election_id: web::Path<String>) -> impl Responder {
    let votes = data.ledger.tally(&election_id);
    HttpResponse::Ok().json(json!({
        "electionId": election_id.into_inner(),
        "votes": votes,
    }))
}

async fn get_chain(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.ledger.audit_chain())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/votes", web::post().to(handle_vote))
        .route("/votes/verify", web::post().to(verify_vote))
        .route("/votes/has-voted", web::post().to(has_voted))
        .route("/elections/{election_id}/tally", web::get().to(get_tally))
        .route("/blockchain", web::get().to(get_chain));
}
