// src/routes/records.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::actor::{Actor, Role};
use super::extract::JsonBody;
use super::{ApiError, ApiResult};
use crate::models::{ChangeHistoryEntry, Record};
use crate::records::{
    self,
    category::{self, CategoryChange},
    RecordDraft, RecordFilter, RecordPatch,
};
use crate::AppState;

#[derive(Serialize)]
pub struct CategoryChanged {
    pub record: Record,
    pub change: ChangeHistoryEntry,
}

pub async fn create_record(
    State(state): State<AppState>,
    actor: Actor,
    Path(shift_id): Path<String>,
    JsonBody(body): JsonBody<RecordDraft>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    actor.require(Role::Edit)?;
    let record = records::create_record(state.store.as_ref(), &shift_id, body, &actor.id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_records(
    State(state): State<AppState>,
    _actor: Actor,
    Path(shift_id): Path<String>,
    Query(filter): Query<RecordFilter>,
) -> ApiResult<Vec<Record>> {
    Ok(Json(records::list_records(state.store.as_ref(), &shift_id, &filter).await?))
}

pub async fn get_record(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Record> {
    Ok(Json(records::get_record(state.store.as_ref(), &id).await?))
}

pub async fn update_record(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RecordPatch>,
) -> ApiResult<Record> {
    actor.require(Role::Edit)?;
    Ok(Json(records::update_record(state.store.as_ref(), &id, body).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    actor.require(Role::Edit)?;
    records::delete_record(state.store.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_category(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CategoryChange>,
) -> ApiResult<CategoryChanged> {
    actor.require(Role::Edit)?;
    let (record, change) =
        category::change_category(state.store.as_ref(), &id, body, &actor.id, &actor.name).await?;
    Ok(Json(CategoryChanged { record, change }))
}

pub async fn history(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Vec<ChangeHistoryEntry>> {
    Ok(Json(category::history(state.store.as_ref(), &id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::routes::test_support::{app, TestApp};
    use crate::store::LogbookStore;

    async fn open_shift(app: &TestApp) -> String {
        let (_, shift) = app
            .call("POST", "/api/v1/shifts", Some("full"), Some(json!({})))
            .await;
        shift["id"].as_str().unwrap().to_owned()
    }

    fn pending_draft(name: &str, priority: &str) -> Value {
        json!({
            "patientId": "P-7",
            "name": name,
            "age": 58,
            "nationalId": "11222333-4",
            "responsibleSurgeon": "Dra. Morales",
            "room": "A2",
            "category": "PENDING",
            "priority": priority,
            "proposedProcedure": "Laparoscopic hernia repair",
            "anesthesiaType": "General",
            "waitReason": "Awaiting pre-op labs"
        })
    }

    #[tokio::test]
    async fn create_list_and_filter() {
        let app = app();
        let shift = open_shift(&app).await;
        let uri = format!("/api/v1/shifts/{shift}/records");

        let (status, _) = app.call("POST", &uri, Some("view"), Some(pending_draft("Ana", "URGENT"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, rec) = app.call("POST", &uri, Some("edit"), Some(pending_draft("Ana Perez", "URGENT"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(rec["category"], "PENDING");
        assert_eq!(rec["carryForward"], false);
        assert_eq!(rec["createdBy"], "u1");
        app.call("POST", &uri, Some("edit"), Some(pending_draft("Luis Rojas", "SCHEDULABLE"))).await;

        let (status, all) = app.call("GET", &uri, Some("view"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (_, urgent) = app.call("GET", &format!("{uri}?priority=URGENT"), Some("view"), None).await;
        assert_eq!(urgent.as_array().unwrap().len(), 1);
        assert_eq!(urgent[0]["name"], "Ana Perez");

        let (_, by_text) = app.call("GET", &format!("{uri}?text=rojas"), Some("view"), None).await;
        assert_eq!(by_text[0]["name"], "Luis Rojas");

        let mut bad = pending_draft("Ana Perez", "URGENT");
        bad["age"] = json!(151);
        let (status, body) = app.call("POST", &uri, Some("edit"), Some(bad)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["details"].as_array().unwrap().iter().any(|d| d.as_str().unwrap().starts_with("age")));
    }

    #[tokio::test]
    async fn undecodable_bodies_are_validation_failures() {
        let app = app();
        let shift = open_shift(&app).await;
        let uri = format!("/api/v1/shifts/{shift}/records");

        // 300 does not fit the age type, so decoding fails before validation runs
        let mut out_of_range = pending_draft("Ana Perez", "URGENT");
        out_of_range["age"] = json!(300);
        let mut missing = pending_draft("Ana Perez", "URGENT");
        missing.as_object_mut().unwrap().remove("name");

        for body in [out_of_range, missing] {
            let (status, body) = app.call("POST", &uri, Some("edit"), Some(body)).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "VALIDATION_FAILED");
            assert_eq!(body["retryable"], false);
            assert!(body["details"].as_array().is_some_and(|d| !d.is_empty()));
        }
        assert!(app.store.records_by_shift(&shift).await.unwrap().is_empty());

        let (status, body) = app
            .call("PATCH", "/api/v1/records/any", Some("edit"), Some(json!({ "age": "old" })))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn change_category_records_history() {
        let app = app();
        let shift = open_shift(&app).await;
        let (_, rec) = app
            .call("POST", &format!("/api/v1/shifts/{shift}/records"), Some("edit"), Some(pending_draft("Ana Perez", "URGENT")))
            .await;
        let id = rec["id"].as_str().unwrap();

        let change = json!({
            "category": "OPERATED",
            "fields": {
                "startTime": "14:00",
                "endTime": "15:10",
                "procedureType": "Hernia repair",
                "anesthesiaType": "General"
            },
            "note": "Theatre 2 freed up"
        });
        let (status, body) = app
            .call("POST", &format!("/api/v1/records/{id}/category"), Some("edit"), Some(change))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["category"], "OPERATED");
        assert_eq!(body["change"]["fromCategory"], "PENDING");
        assert_eq!(body["change"]["actorName"], "Dr. A");

        let (_, history) = app
            .call("GET", &format!("/api/v1/records/{id}/history"), Some("view"), None)
            .await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["note"], "Theatre 2 freed up");

        let incomplete = json!({ "category": "NOTE", "fields": { "noteType": "Staff" } });
        let (status, _) = app
            .call("POST", &format!("/api/v1/records/{id}/category"), Some("edit"), Some(incomplete))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn patch_and_delete() {
        let app = app();
        let shift = open_shift(&app).await;
        let (_, rec) = app
            .call("POST", &format!("/api/v1/shifts/{shift}/records"), Some("edit"), Some(pending_draft("Ana Perez", "URGENT")))
            .await;
        let uri = format!("/api/v1/records/{}", rec["id"].as_str().unwrap());

        let (status, patched) = app.call("PATCH", &uri, Some("edit"), Some(json!({ "room": "C1" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["room"], "C1");
        assert_eq!(patched["priority"], "URGENT");

        let (status, _) = app.call("DELETE", &uri, Some("edit"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = app.call("GET", &uri, Some("view"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
