//! Integration Tests for the Hexcell Server
//!
//! These tests drive the grid HTTP routes end to end through the router,
//! testing the system as a whole rather than individual units.

use std::collections::HashSet;

use axum::http::StatusCode;
use hexcell_server::grid::point_in_ring;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tower::util::ServiceExt;

mod common;
use common::*;

// ============================================================================
// HTTP Route Integration Tests
// ============================================================================

mod http_routes {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint_returns_ok() {
        let app = create_test_app();

        let response = app.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["grid_backend"].is_string());
        assert_eq!(json["native_polyfill"], true);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn test_health_reports_sampler_only() {
        let app = create_sampler_only_app();

        let response = app.oneshot(get("/healthz")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["native_polyfill"], false);
    }

    #[tokio::test]
    async fn test_index_round_trips_cell_center() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(get(&format!("/h3/center/{}", SF_CELL)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let center = body_json(response).await;
        assert_eq!(center["res"], 9);
        let lat = center["lat"].as_f64().unwrap();
        let lng = center["lng"].as_f64().unwrap();
        assert!((lat - 37.77).abs() < 0.05);
        assert!((lng + 122.41).abs() < 0.05);

        let response = app
            .oneshot(get(&format!("/h3/index?lat={}&lng={}&res=9", lat, lng)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["cell"], SF_CELL);
    }

    #[tokio::test]
    async fn test_index_uses_default_resolution() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(get("/h3/index?lat=-23.55&lng=-46.63"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cell = body_json(response).await["cell"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(get(&format!("/h3/center/{}", cell)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["res"], 9);
    }

    #[tokio::test]
    async fn test_index_rejects_out_of_range_latitude() {
        let app = create_test_app();

        let response = app
            .oneshot(get("/h3/index?lat=95&lng=10&res=9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "coordinate_out_of_bounds");
    }

    #[tokio::test]
    async fn test_index_rejects_bad_resolution() {
        let app = create_test_app();

        for res in ["16", "-1"] {
            let response = app
                .clone()
                .oneshot(get(&format!("/h3/index?lat=10&lng=10&res={}", res)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "res={}", res);
            assert_eq!(body_json(response).await["code"], "invalid_resolution");
        }
    }

    #[tokio::test]
    async fn test_index_rejects_non_numeric_query() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(get("/h3/index?lat=north&lng=10"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "invalid_request");
        assert!(json["error"].is_string());

        let response = app.oneshot(get("/h3/index?lng=10")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_kring_rejects_non_numeric_k() {
        let app = create_test_app();

        let response = app
            .oneshot(get(&format!("/h3/kring?cell={}&k=two", SF_CELL)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_boundary_has_six_vertices() {
        let app = create_test_app();

        let response = app
            .oneshot(get(&format!("/h3/boundary/{}", SF_CELL)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let boundary = json["boundary"].as_array().unwrap();
        assert_eq!(boundary.len(), 6);
        for vertex in boundary {
            let [lat, lng] = [vertex[0].as_f64().unwrap(), vertex[1].as_f64().unwrap()];
            assert!((lat - 37.77).abs() < 0.05, "expected [lat, lng], got {:?}", vertex);
            assert!((lng + 122.41).abs() < 0.05);
        }
    }

    #[tokio::test]
    async fn test_invalid_cell_rejected() {
        let app = create_test_app();

        for uri in [
            "/h3/boundary/not-a-cell".to_string(),
            "/h3/center/ffffffffffffffff".to_string(),
            "/h3/kring?cell=xyz&k=1".to_string(),
        ] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body_json(response).await["code"], "invalid_cell");
        }
    }

    #[tokio::test]
    async fn test_kring_returns_disk() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(get(&format!("/h3/kring?cell={}&k=1", SF_CELL)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let cells: HashSet<&str> = json["cells"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c.as_str().unwrap())
            .collect();
        assert_eq!(cells.len(), 7);
        assert!(cells.contains(SF_CELL));
        assert!(cells.contains("8928308280bffff"));
        assert!(cells.contains("89283082807ffff"));

        let response = app
            .oneshot(get(&format!("/h3/kring?cell={}&k=0", SF_CELL)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["cells"], serde_json::json!([SF_CELL]));
    }

    #[tokio::test]
    async fn test_kring_default_k_is_one() {
        let app = create_test_app();

        let response = app
            .oneshot(get(&format!("/h3/kring?cell={}", SF_CELL)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["cells"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_kring_rejects_k_out_of_range() {
        let app = create_test_app();

        for k in ["-1", "11"] {
            let response = app
                .clone()
                .oneshot(get(&format!("/h3/kring?cell={}&k={}", SF_CELL, k)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "k={}", k);
            assert_eq!(body_json(response).await["code"], "invalid_k");
        }
    }
}

// ============================================================================
// Polyfill Integration Tests
// ============================================================================

mod polyfill {
    use super::*;

    fn cells_of(json: &serde_json::Value) -> Vec<String> {
        json["cells"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c.as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_polyfill_native() {
        let app = create_test_app();

        let body = serde_json::json!({ "polygon": sao_paulo_square(), "res": 9 });
        let response = app.oneshot(post_json("/h3/polyfill", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let cells = cells_of(&json);
        assert_eq!(json["method"], "native");
        assert!(!cells.is_empty());
        assert_eq!(json["count"].as_u64().unwrap() as usize, cells.len());
    }

    #[tokio::test]
    async fn test_polyfill_falls_back_when_native_fails() {
        let app = create_failing_native_app();

        let body = serde_json::json!({ "polygon": sao_paulo_square(), "res": 9 });
        let response = app.oneshot(post_json("/h3/polyfill", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let cells = cells_of(&json);
        assert_eq!(json["method"], "sampled");
        assert!(!cells.is_empty());
        assert_eq!(json["count"].as_u64().unwrap() as usize, cells.len());

        let unique: HashSet<&String> = cells.iter().collect();
        assert_eq!(unique.len(), cells.len());
    }

    #[tokio::test]
    async fn test_sampler_overlaps_native_result() {
        let body = serde_json::json!({ "polygon": sao_paulo_square(), "res": 8 });

        let native = body_json(
            create_test_app()
                .oneshot(post_json("/h3/polyfill", &body))
                .await
                .unwrap(),
        )
        .await;
        let sampled = body_json(
            create_sampler_only_app()
                .oneshot(post_json("/h3/polyfill", &body))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(sampled["method"], "sampled");

        let native: HashSet<String> = cells_of(&native).into_iter().collect();
        let sampled: HashSet<String> = cells_of(&sampled).into_iter().collect();
        assert!(native.intersection(&sampled).count() > 0);
    }

    #[tokio::test]
    async fn test_polyfill_is_deterministic() {
        let body = serde_json::json!({ "polygon": sao_paulo_square(), "res": 9 });

        let first = body_json(
            create_sampler_only_app()
                .oneshot(post_json("/h3/polyfill", &body))
                .await
                .unwrap(),
        )
        .await;
        let second = body_json(
            create_sampler_only_app()
                .oneshot(post_json("/h3/polyfill", &body))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(first["cells"], second["cells"]);
    }

    /// Square a few centimetres wide, far smaller than a res 9 cell
    fn sub_cell_square() -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[
                [-46.6300000, -23.5500000],
                [-46.6299995, -23.5500000],
                [-46.6299995, -23.5499995],
                [-46.6300000, -23.5499995],
                [-46.6300000, -23.5500000]
            ]]
        })
    }

    #[tokio::test]
    async fn test_sub_cell_polygon_native_is_empty() {
        let body = serde_json::json!({ "polygon": sub_cell_square(), "res": 9 });

        let response = create_test_app()
            .oneshot(post_json("/h3/polyfill", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["method"], "native");
        assert_eq!(json["count"], 0);
        assert_eq!(json["cells"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_sub_cell_polygon_sampler_yields_one_cell() {
        let body = serde_json::json!({ "polygon": sub_cell_square(), "res": 9 });

        let response = create_sampler_only_app()
            .oneshot(post_json("/h3/polyfill", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["method"], "sampled");
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_polyfill_rejects_non_polygon() {
        let app = create_test_app();

        let body = serde_json::json!({
            "polygon": { "type": "Point", "coordinates": [[[-46.6, -23.5]]] },
            "res": 9
        });
        let response = app.oneshot(post_json("/h3/polyfill", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_polygon");
    }

    #[tokio::test]
    async fn test_polyfill_rejects_short_ring() {
        let app = create_test_app();

        let body = serde_json::json!({
            "polygon": { "type": "Polygon", "coordinates": [[[-46.6, -23.5], [-46.5, -23.5]]] }
        });
        let response = app.oneshot(post_json("/h3/polyfill", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_polygon");
    }

    #[tokio::test]
    async fn test_polyfill_rejects_missing_polygon() {
        let app = create_test_app();

        let response = app
            .oneshot(post_json("/h3/polyfill", &serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "invalid_request");
        assert!(json["error"].as_str().unwrap().contains("polygon"));
    }

    #[tokio::test]
    async fn test_polyfill_rejects_malformed_body() {
        let app = create_test_app();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/h3/polyfill")
            .header("Content-Type", "application/json")
            .body(axum::body::Body::from("{\"polygon\": "))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_polyfill_rejects_bad_resolution() {
        let app = create_test_app();

        let body = serde_json::json!({ "polygon": sao_paulo_square(), "res": 20 });
        let response = app.oneshot(post_json("/h3/polyfill", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_resolution");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod properties {
    use super::*;

    /// A point lies inside the boundary of the cell it indexes to.
    #[tokio::test]
    async fn test_boundary_contains_indexed_point() {
        let app = create_test_app();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..50 {
            let lat: f64 = rng.random_range(-60.0..60.0);
            let lng: f64 = rng.random_range(-170.0..170.0);

            let response = app
                .clone()
                .oneshot(get(&format!("/h3/index?lat={}&lng={}&res=9", lat, lng)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let cell = body_json(response).await["cell"]
                .as_str()
                .unwrap()
                .to_string();

            let response = app
                .clone()
                .oneshot(get(&format!("/h3/boundary/{}", cell)))
                .await
                .unwrap();
            let json = body_json(response).await;
            let ring: Vec<[f64; 2]> = json["boundary"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| [v[1].as_f64().unwrap(), v[0].as_f64().unwrap()])
                .collect();

            assert!(
                point_in_ring(lng, lat, &ring),
                "({}, {}) not inside boundary of {}",
                lat,
                lng,
                cell
            );
        }
    }

    /// Away from pentagons a k-ring holds 3k(k+1)+1 cells.
    #[tokio::test]
    async fn test_kring_grows_with_k() {
        let app = create_test_app();

        let mut previous = 0;
        for k in 0..=3 {
            let response = app
                .clone()
                .oneshot(get(&format!("/h3/kring?cell={}&k={}", SF_CELL, k)))
                .await
                .unwrap();
            let count = body_json(response).await["cells"]
                .as_array()
                .unwrap()
                .len();
            assert_eq!(count, 3 * k * (k + 1) + 1);
            assert!(count > previous);
            previous = count;
        }
    }
}
