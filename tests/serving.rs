mod common;

use outbreak_core::serving::OutbreakService;
use outbreak_core::training::run_training;
use outbreak_core::OutbreakError;

use common::{config_for, latin1, record, synthetic_csv, HEADER};

#[test]
fn serving_before_training_asks_for_training() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("vigilancia.csv");
    std::fs::write(&dataset, latin1(&synthetic_csv())).unwrap();

    let err = OutbreakService::open(config_for(dir.path(), &dataset)).unwrap_err();
    assert!(matches!(err, OutbreakError::ArtifactsMissing(_)));
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("Run training first"));
}

#[test]
fn train_then_predict_latest_week() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("vigilancia.csv");
    std::fs::write(&dataset, latin1(&synthetic_csv())).unwrap();
    let config = config_for(dir.path(), &dataset);

    let outcome = run_training(&config).unwrap();
    assert!((0.0..=1.0).contains(&outcome.report.accuracy));
    assert!(outcome.n_train > outcome.n_test);
    assert!(config.model_path().exists());
    assert!(config.encoder_path().exists());

    let mut service = OutbreakService::open(config).unwrap();
    assert_eq!(service.department_options().unwrap(), ["ICA", "LIMA", "PIURA"]);
    assert_eq!(service.default_department(), Some("LIMA"));

    let prediction = service.predict_latest("LIMA").unwrap();
    assert_eq!((prediction.year, prediction.week), (2022, 20));
    let [p0, p1] = prediction.probabilities;
    assert!((p0 + p1 - 1.0).abs() < 1e-9);
    assert!(prediction.confidence() >= 0.5);

    let series = service.weekly_cases("PIURA").unwrap();
    assert_eq!(series.len(), 20);
    assert_eq!(series[0].week, 1);
    assert!(series.windows(2).all(|w| (w[0].year, w[0].week) < (w[1].year, w[1].week)));
    // week 6 spike: (6 * 7 + 2 * 3) % 5 + 6 = 9
    assert_eq!(series[5].cases, 9);
}

#[test]
fn request_errors_do_not_poison_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("vigilancia.csv");
    std::fs::write(&dataset, latin1(&synthetic_csv())).unwrap();
    let config = config_for(dir.path(), &dataset);
    run_training(&config).unwrap();
    let mut service = OutbreakService::open(config).unwrap();

    let unseen = service.predict_latest("CUSCO").unwrap_err();
    assert!(matches!(unseen, OutbreakError::UnseenCategory { .. }));
    assert!(unseen.is_recoverable());

    // dataset refreshed without ICA rows: ICA is known but has no data
    let mut lines = vec![HEADER.to_string()];
    for week in 1..=4 {
        lines.push(record("LIMA", "BREÑA", 2022, week, "C", "40"));
    }
    std::fs::write(&dataset, latin1(&lines.join("\n"))).unwrap();

    let empty = service.weekly_cases("ICA").unwrap_err();
    assert!(matches!(empty, OutbreakError::EmptyFilterResult(_)));

    // the service keeps answering after both failures
    let prediction = service.predict_latest("LIMA").unwrap();
    assert_eq!(prediction.week, 4);
}

#[test]
fn unseen_district_fails_only_that_request() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("vigilancia.csv");
    std::fs::write(&dataset, latin1(&synthetic_csv())).unwrap();
    let config = config_for(dir.path(), &dataset);
    run_training(&config).unwrap();
    let mut service = OutbreakService::open(config).unwrap();

    let mut csv = synthetic_csv();
    csv.push_str(&record("ICA", "SANTIAGO", 2022, 21, "C", "12"));
    csv.push('\n');
    std::fs::write(&dataset, latin1(&csv)).unwrap();

    let err = service.predict_latest("ICA").unwrap_err();
    assert!(matches!(err, OutbreakError::UnseenCategory { ref field, .. } if field == "distrito"));
    assert!(service.predict_latest("PIURA").is_ok());
}
