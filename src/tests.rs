use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::csv_reader::{read_dataset, FEATURE_COLUMNS};
use crate::kmeans::{fit_clusters, AnalysisResult, ClusterAnalyzer, ClusterReport};
use crate::server::router;

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Time,V10,V11,V12,V14,V16,V17,V18,Amount,Class";

    // 95 legitimate rows around the origin and 5 fraudulent rows far away
    fn golden_csv() -> String {
        let mut csv = String::from(HEADER);
        csv.push('\n');
        for i in 0..100usize {
            let fraud = i >= 95;
            let values: Vec<String> = (0..7usize)
                .map(|j| {
                    let jitter = ((i * 37 + j * 11) % 17) as f64 / 10.0;
                    let value = if fraud { -20.0 + jitter / 10.0 } else { jitter };
                    format!("{value:.3}")
                })
                .collect();
            csv.push_str(&format!(
                "{i},{},{:.2},{}\n",
                values.join(","),
                (i as f64) * 1.25,
                if fraud { "\"1\"" } else { "\"0\"" }
            ));
        }
        csv
    }

    fn write_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("creditcard.zip");
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, contents) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn golden_analyzer(dir: &Path) -> ClusterAnalyzer {
        let csv = golden_csv();
        ClusterAnalyzer::new(write_archive(dir, &[("creditcard.csv", csv.as_str())]))
    }

    fn check_report_invariants(result: &AnalysisResult, n_clusters: usize, n_rows: usize) {
        assert_eq!(result.n_clusters_used, n_clusters);
        assert_eq!(result.clusters_analysis.len(), n_clusters);

        for (expected_id, cluster) in result.clusters_analysis.iter().enumerate() {
            assert_eq!(cluster.cluster_id, expected_id);
            assert!(cluster.fraud_samples <= cluster.total_samples);
            let expected_pct = if cluster.total_samples == 0 {
                0.0
            } else {
                let raw = cluster.fraud_samples as f64 / cluster.total_samples as f64 * 100.0;
                (raw * 10_000.0).round() / 10_000.0
            };
            assert_eq!(cluster.fraud_percentage, expected_pct);
            assert_eq!(cluster.is_high_risk, cluster.fraud_percentage > 50.0);
        }

        let total: usize = result.clusters_analysis.iter().map(|c| c.total_samples).sum();
        assert_eq!(total, n_rows);
        assert!((0.0..=1.0).contains(&result.metrics.purity_score));
    }

    #[test]
    fn feature_columns_are_fixed() {
        assert_eq!(FEATURE_COLUMNS, ["V17", "V14", "V16", "V12", "V10", "V11", "V18"]);
    }

    #[test]
    fn golden_fixture_two_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let result = golden_analyzer(dir.path()).run(2).unwrap();
        check_report_invariants(&result, 2, 100);

        let fraud_total: usize = result.clusters_analysis.iter().map(|c| c.fraud_samples).sum();
        assert_eq!(fraud_total, 5);

        // row 0 is legitimate, so the legitimate cluster is id 0
        let expected = vec![
            ClusterReport {
                cluster_id: 0,
                total_samples: 95,
                fraud_samples: 0,
                fraud_percentage: 0.0,
                is_high_risk: false,
            },
            ClusterReport {
                cluster_id: 1,
                total_samples: 5,
                fraud_samples: 5,
                fraud_percentage: 100.0,
                is_high_risk: true,
            },
        ];
        assert_eq!(result.clusters_analysis, expected);

        assert_eq!(result.metrics.purity_score, 1.0);
        assert_eq!(result.metrics.silhouette_score, 0.9704);
        assert_eq!(result.metrics.calinski_harabasz, 8761.29);
    }

    #[test]
    fn golden_fixture_assignment_per_row() {
        let csv = golden_csv();
        let dataset = read_dataset(csv.as_bytes()).unwrap();
        let assignment = fit_clusters(&dataset.features, 2).unwrap();

        let expected: Vec<usize> = (0..100).map(|row| usize::from(row >= 95)).collect();
        assert_eq!(assignment.to_vec(), expected);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = golden_analyzer(dir.path());
        for n_clusters in [2, 3, 5] {
            let first = analyzer.run(n_clusters).unwrap();
            let second = analyzer.run(n_clusters).unwrap();
            assert_eq!(first, second, "n_clusters = {n_clusters}");
            check_report_invariants(&first, n_clusters, 100);
        }
    }

    #[test]
    fn more_clusters_than_rows_is_invalid_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let csv = format!("{HEADER}\n0,1,1,1,1,1,1,1,1,0\n1,2,2,2,2,2,2,2,2,1\n2,3,3,3,3,3,3,3,3,0\n");
        let analyzer = ClusterAnalyzer::new(write_archive(dir.path(), &[("data.csv", csv.as_str())]));

        let err = analyzer.run(4).unwrap_err();
        assert_eq!(err.kind(), "invalid_parameter");
    }

    #[test]
    fn missing_archive_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ClusterAnalyzer::new(dir.path().join("creditcard.zip"));
        let err = analyzer.run(2).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn archive_without_csv_reports_no_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), &[("readme.txt", "nothing here"), ("data.json", "{}")]);
        let err = ClusterAnalyzer::new(path).run(2).unwrap_err();
        assert_eq!(err.kind(), "no_data_file");
        assert!(err.to_string().contains("does not contain any CSV"));
    }

    #[test]
    fn missing_feature_column_reports_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let csv = "Time,V10,V11,V12,V14,V16,V18,Amount,Class\n0,1,1,1,1,1,1,1,0\n";
        let path = write_archive(dir.path(), &[("creditcard.csv", csv)]);
        let err = ClusterAnalyzer::new(path).run(2).unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert!(err.to_string().contains("V17"));
    }

    #[test]
    fn only_first_csv_entry_is_read() {
        let golden = golden_csv();
        let broken = "a,b\n1,2\n";

        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), &[("notes.txt", "x"), ("first.csv", golden.as_str()), ("second.csv", broken)]);
        assert!(ClusterAnalyzer::new(path).run(2).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), &[("first.csv", broken), ("second.csv", golden.as_str())]);
        assert_eq!(ClusterAnalyzer::new(path).run(2).unwrap_err().kind(), "schema");
    }

    async fn post_json(app: axum::Router, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/kmeans")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn endpoint_returns_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(Arc::new(golden_analyzer(dir.path())));

        let (status, body) = post_json(app, r#"{"n_clusters": "2"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["n_clusters_used"], 2);
        assert_eq!(body["clusters_analysis"].as_array().unwrap().len(), 2);
        assert_eq!(body["metrics"]["purity_score"], 1.0);
        assert_eq!(body["metrics"]["silhouette_score"], 0.9704);
        assert_eq!(body["clusters_analysis"][1]["fraud_samples"], 5);
        assert!(body["metrics"]["silhouette_score"].is_number());
        assert!(body["metrics"]["calinski_harabasz"].is_number());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn endpoint_rejects_out_of_range_before_analysis() {
        // no archive on disk: a 400 proves the core was never reached
        let dir = tempfile::tempdir().unwrap();
        let analyzer = Arc::new(ClusterAnalyzer::new(dir.path().join("missing.zip")));

        for body in [r#"{"n_clusters": 1}"#, r#"{"n_clusters": 21}"#] {
            let (status, json) = post_json(router(analyzer.clone()), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(json["kind"], "bad_request");
            assert_eq!(json["error"], "valid range: 2-20");
        }

        let (status, json) = post_json(router(analyzer.clone()), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "missing 'n_clusters'");

        let (status, json) = post_json(router(analyzer), "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "bad_request");
    }

    #[tokio::test]
    async fn endpoint_maps_core_errors_to_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(Arc::new(ClusterAnalyzer::new(dir.path().join("creditcard.zip"))));

        let (status, json) = post_json(app, r#"{"n_clusters": 3}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["kind"], "not_found");
        assert!(json["error"].as_str().unwrap().contains("archive not found"));
    }

    #[tokio::test]
    async fn health_endpoint_is_up() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(Arc::new(ClusterAnalyzer::new(dir.path().join("creditcard.zip"))));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
