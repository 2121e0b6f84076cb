//! End-to-end sessions against the loopback mock instrument, driven by the
//! shipped UHFQA catalog.

use std::sync::Arc;
use std::time::Duration;

use lockin_daq::core::EngineError;
use lockin_daq::{
    Catalog, DispatchEngine, EngineSettings, MockHandle, MockInstrument, PlaybackRate, Value,
};

const CATALOG: &str = include_str!("../catalogs/uhfqa.yaml");

fn test_settings() -> EngineSettings {
    EngineSettings {
        backoff_ms: 1,
        chunk_samples: 2,
        poll_interval_ms: 5,
        ..Default::default()
    }
}

fn engine() -> (DispatchEngine, MockHandle) {
    let catalog = Arc::new(Catalog::from_yaml(CATALOG).unwrap());
    let (mock, handle) = MockInstrument::new();
    let engine = DispatchEngine::new(catalog, Box::new(mock), test_settings()).unwrap();
    (engine, handle)
}

#[tokio::test]
async fn test_offset_set_sends_once_and_caches_on_ack() {
    let (engine, handle) = engine();

    engine.set("SigOut1On", Value::Bool(true)).await.unwrap();
    engine.set("OffsetSigOut1", Value::Double(0.25)).await.unwrap();

    assert_eq!(
        handle.log().await,
        vec![
            "/dev2086/sigouts/0/on 1".to_string(),
            "/dev2086/sigouts/0/offset 0.25".to_string(),
        ]
    );
    assert_eq!(
        engine.cached("OffsetSigOut1").await,
        Some(Value::Double(0.25))
    );

    // A warm get is served from the cache, no further wire traffic.
    let value = engine.get("OffsetSigOut1").await.unwrap();
    assert_eq!(value, Value::Double(0.25));
    assert_eq!(handle.log().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sets_commit_cache_in_ack_order() {
    let (engine, handle) = engine();
    let engine = Arc::new(engine);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine
                .set("Oscillator1Frequency", Value::Double(1e6 * f64::from(i)))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Whatever order the writes were scheduled in, the cache holds the
    // value the device acknowledged last.
    let device = handle.node("/dev2086/oscs/0/freq").await.unwrap();
    let cached = engine.cached("Oscillator1Frequency").await.unwrap();
    assert_eq!(cached.render(), device);
}

#[tokio::test]
async fn test_cold_get_queries_device_then_caches() {
    let (engine, handle) = engine();
    handle.set_node("/dev2086/oscs/1/freq", "383000000").await;

    let value = engine.get("Oscillator2Frequency").await.unwrap();
    assert_eq!(value, Value::Double(383e6));
    assert_eq!(handle.log().await, vec!["/dev2086/oscs/1/freq".to_string()]);

    engine.get("Oscillator2Frequency").await.unwrap();
    assert_eq!(handle.log().await.len(), 1);
}

#[tokio::test]
async fn test_out_of_range_set_rejected_without_io() {
    let (engine, handle) = engine();
    engine.set("AWGRun", Value::Bool(true)).await.unwrap();
    let sent_before = handle.log().await.len();

    let err = engine
        .set("AmplitudeOutput1AWG", Value::Double(1.5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::OutOfRange { value, low, high, .. }
            if value == 1.5 && low == -1.0 && high == 1.0
    ));
    assert_eq!(handle.log().await.len(), sent_before);

    // Boundaries are inclusive.
    engine
        .set("AmplitudeOutput1AWG", Value::Double(1.0))
        .await
        .unwrap();
    engine
        .set("AmplitudeOutput1AWG", Value::Double(-1.0))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_combo_round_trip_for_every_label() {
    let (engine, handle) = engine();
    let labels = ["Signal Input 1", "Signal Input 2", "Trigger Input 1", "Trigger Input 2"];
    for (code, label) in labels.iter().enumerate() {
        engine
            .set("ScopeTrigger", Value::Str((*label).to_string()))
            .await
            .unwrap();
        assert_eq!(
            handle.node("/dev2086/scopes/0/trigchannel").await,
            Some(code.to_string())
        );
        assert_eq!(
            engine.get("ScopeTrigger").await.unwrap(),
            Value::Str((*label).to_string())
        );
    }

    let err = engine
        .set("ScopeTrigger", Value::Str("Trigger Input 3".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownComboValue { .. }));
}

#[tokio::test]
async fn test_combo_decode_from_device_code() {
    let (engine, handle) = engine();
    handle.set_node("/dev2086/sigouts/0/range", "1.5").await;
    assert_eq!(
        engine.get("RangeSigOut1").await.unwrap(),
        Value::Str("1.5 V".to_string())
    );
}

#[tokio::test]
async fn test_visibility_gates_set_until_controller_is_on() {
    let (engine, handle) = engine();

    // Controller reads back 0 from the mock, so the dependent is inactive.
    let err = engine
        .set("OffsetSigOut1", Value::Double(0.1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotVisible { ref controller, .. } if controller == "SigOut1On"
    ));
    // Only the controller read reached the wire.
    assert_eq!(handle.log().await, vec!["/dev2086/sigouts/0/on".to_string()]);

    engine.set("SigOut1On", Value::Bool(true)).await.unwrap();
    engine.set("OffsetSigOut1", Value::Double(0.1)).await.unwrap();
    assert_eq!(
        handle.node("/dev2086/sigouts/0/offset").await,
        Some("0.1".to_string())
    );
}

#[tokio::test]
async fn test_disabled_quantity_refuses_set() {
    let yaml = r#"
instrument:
  model: UHFQA
  default_address: dev2086
quantities:
  LegacyKnob:
    datatype: DOUBLE
    enabled: false
    get_cmd: "/{dev}/legacy/knob"
"#;
    let catalog = Arc::new(Catalog::from_yaml(yaml).unwrap());
    let (mock, handle) = MockInstrument::new();
    let engine = DispatchEngine::new(catalog, Box::new(mock), test_settings()).unwrap();

    let err = engine.set("LegacyKnob", Value::Double(1.0)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotVisible { .. }));
    assert!(handle.log().await.is_empty());
}

#[tokio::test]
async fn test_unknown_quantity() {
    let (engine, _handle) = engine();
    assert!(matches!(
        engine.get("Nonexistent").await,
        Err(EngineError::UnknownQuantity(_))
    ));
}

#[tokio::test]
async fn test_permission_gating_is_local() {
    let (engine, handle) = engine();

    let err = engine
        .set("DeviceSerial", Value::Str("x".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { .. }));

    // Write-only quantity: a cold device read is refused.
    let err = engine.get("DIOOutput").await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { .. }));
    assert!(handle.log().await.is_empty());

    // After a successful set the cache serves reads.
    engine.set("DIOOutput", Value::Double(5.0)).await.unwrap();
    assert_eq!(engine.get("DIOOutput").await.unwrap(), Value::Double(5.0));
}

#[tokio::test]
async fn test_button_press_sends_and_never_caches() {
    let (engine, handle) = engine();
    engine.press("FactoryReset").await.unwrap();
    assert_eq!(
        handle.log().await,
        vec!["/dev2086/system/preset/load 1".to_string()]
    );
    assert_eq!(engine.cached("FactoryReset").await, None);

    // set() on a BUTTON routes through press.
    engine.set("FactoryReset", Value::Bool(true)).await.unwrap();
    assert_eq!(engine.cached("FactoryReset").await, None);
}

#[tokio::test]
async fn test_reset_clears_cache() {
    let (engine, _handle) = engine();
    engine.set("SigOut1On", Value::Bool(true)).await.unwrap();
    assert!(engine.cached("SigOut1On").await.is_some());

    engine.reset("FactoryReset").await.unwrap();
    assert_eq!(engine.cached("SigOut1On").await, None);
}

#[tokio::test]
async fn test_sweep_and_stop() {
    let (engine, handle) = engine();
    engine
        .sweep("Oscillator1Frequency", Value::Double(10e6), 1000.0)
        .await
        .unwrap();
    engine.stop_sweep("Oscillator1Frequency").await.unwrap();
    assert_eq!(
        handle.log().await,
        vec![
            "/dev2086/oscs/0/freq/ramp 10000000 1000".to_string(),
            "/dev2086/oscs/0/freq/ramp/stop".to_string(),
        ]
    );

    // A quantity without a sweep template cannot sweep.
    let err = engine
        .sweep("OffsetSigOut1", Value::Double(0.0), 1.0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SweepUnsupported(_)));
}

#[tokio::test]
async fn test_sweep_target_is_range_checked() {
    let (engine, _handle) = engine();
    let err = engine
        .sweep("Oscillator1Frequency", Value::Double(-1.0), 1000.0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OutOfRange { .. }));
}

#[tokio::test]
async fn test_upload_preserves_order_and_sets_rate_first() {
    let (engine, handle) = engine();
    handle.mark_vector("/dev2086/awgs/0/waveform/data").await;

    let samples = [0.0, 0.5, -0.5, 1.0];
    engine
        .upload_waveform("LoadedVector", &samples, PlaybackRate::Div8)
        .await
        .unwrap();

    // Rate write first, then chunks of two samples, strictly in order.
    assert_eq!(
        handle.log().await,
        vec![
            "/dev2086/awgs/0/time 3".to_string(),
            "/dev2086/awgs/0/waveform/data 0,0.5".to_string(),
            "/dev2086/awgs/0/waveform/data -0.5,1".to_string(),
        ]
    );
    assert_eq!(
        handle.node("/dev2086/awgs/0/waveform/data").await,
        Some("0,0.5,-0.5,1".to_string())
    );
    assert_eq!(
        engine.cached("LoadedVector").await,
        Some(Value::Vector(samples.to_vec()))
    );
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let (engine, handle) = engine();
    let err = engine
        .upload_waveform("LoadedVector", &[], PlaybackRate::Full)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyVector(_)));
    assert!(handle.log().await.is_empty());
}

#[tokio::test]
async fn test_scalar_set_refuses_vector_payload() {
    let (engine, handle) = engine();
    handle.mark_vector("/dev2086/awgs/0/waveform/data").await;

    // Waveforms only move through the chunked upload path; a plain set
    // would bypass it and is refused before any wire traffic.
    let err = engine
        .set("LoadedVector", Value::Vector(vec![0.0, 0.5, -0.5, 1.0]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TypeMismatch { .. }));
    assert!(handle.log().await.is_empty());
    assert_eq!(engine.cached("LoadedVector").await, None);
}

#[tokio::test]
async fn test_upload_aborts_on_chunk_failure() {
    let (engine, handle) = engine();
    handle.mark_vector("/dev2086/awgs/0/waveform/data").await;
    // Rate write and chunk one go through, chunk two fails on its one and
    // only try.
    handle.timeout_after(2, 1).await;

    let samples = [0.0, 0.5, -0.5, 1.0];
    let err = engine
        .upload_waveform("LoadedVector", &samples, PlaybackRate::Div8)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransportTimeout { .. }));

    // Only the first chunk landed; on-instrument state is now partial and
    // the caller is expected to resend the whole vector.
    assert_eq!(
        handle.node("/dev2086/awgs/0/waveform/data").await,
        Some("0,0.5".to_string())
    );
    assert_eq!(engine.cached("LoadedVector").await, None);
}

#[tokio::test]
async fn test_trace_poll_waits_for_data_and_tags_axes() {
    let (engine, handle) = engine();
    engine.set("ScopeRun", Value::Bool(true)).await.unwrap();
    handle.set_node("/dev2086/scopes/0/wave", "0,0.25,0.5,0.25,0").await;
    handle.delay_data("/dev2086/scopes/0/wave", 2).await;

    let trace = engine
        .fetch_trace("ScopeVector", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(trace.samples, vec![0.0, 0.25, 0.5, 0.25, 0.0]);
    assert_eq!(trace.x_name.as_deref(), Some("Time"));
    assert_eq!(trace.x_unit.as_deref(), Some("s"));

    // Two empty polls preceded the data.
    let polls = handle
        .log()
        .await
        .iter()
        .filter(|c| *c == "/dev2086/scopes/0/wave")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn test_trace_deadline_expires_when_data_never_arrives() {
    let (engine, handle) = engine();
    engine.set("ScopeRun", Value::Bool(true)).await.unwrap();
    handle.set_node("/dev2086/scopes/0/wave", "1,2,3").await;
    handle.delay_data("/dev2086/scopes/0/wave", 1_000_000).await;

    let err = engine
        .fetch_trace("ScopeVector", Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransportTimeout { .. }));
}

#[tokio::test]
async fn test_transient_fault_is_retried() {
    let (engine, handle) = engine();
    handle.timeout_next(1).await;

    engine.set("SigOut1On", Value::Bool(true)).await.unwrap();
    // First try timed out, the retry carried the same command.
    assert_eq!(
        handle.log().await,
        vec![
            "/dev2086/sigouts/0/on 1".to_string(),
            "/dev2086/sigouts/0/on 1".to_string(),
        ]
    );
    assert_eq!(engine.cached("SigOut1On").await, Some(Value::Bool(true)));
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let (engine, handle) = engine();
    // Default budget is two retries after the first try.
    handle.timeout_next(3).await;

    let err = engine.set("SigOut1On", Value::Bool(true)).await.unwrap_err();
    assert!(matches!(err, EngineError::TransportTimeout { .. }));
    assert_eq!(handle.log().await.len(), 3);
    // The failed set never reached the cache.
    assert_eq!(engine.cached("SigOut1On").await, None);
}

#[tokio::test]
async fn test_device_rejection_is_never_retried() {
    let (engine, handle) = engine();
    handle.respond_next("ERR 113: invalid node path").await;

    let err = engine.set("SigOut1On", Value::Bool(true)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::DeviceRejected { ref command, .. }
            if command == "/dev2086/sigouts/0/on 1"
    ));
    assert_eq!(handle.log().await.len(), 1);
    assert_eq!(engine.cached("SigOut1On").await, None);
}

#[tokio::test]
async fn test_clear_cache_forces_device_read() {
    let (engine, handle) = engine();
    engine.set("SigOut1On", Value::Bool(true)).await.unwrap();
    engine.clear_cache().await;

    // The node still holds the written value; the next get re-reads it.
    let value = engine.get("SigOut1On").await.unwrap();
    assert_eq!(value, Value::Bool(true));
    assert_eq!(handle.log().await.len(), 2);
}
