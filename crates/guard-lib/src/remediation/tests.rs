//! Handler tests against the fixture cloud
//!
//! Each test builds a snapshot, runs one invocation and inspects the
//! recorded actions.

#[cfg(test)]
mod handler_tests {
    use crate::error::GuardError;
    use crate::models::RemediationAction;
    use crate::remediation::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn web_group() -> Value {
        json!({
            "groups": {
                "web-asg": [
                    {"instance_id": "i-a", "lifecycle_state": "InService"},
                    {"instance_id": "i-b", "lifecycle_state": "InService"},
                    {"instance_id": "i-c", "lifecycle_state": "Terminating"},
                    {"instance_id": "i-d", "lifecycle_state": "InService"}
                ]
            },
            "cpu": {
                "i-a": [{"age_secs": 60, "value": 35.0}],
                "i-b": [{"age_secs": 60, "value": 80.0}, {"age_secs": 120, "value": 90.0}],
                "i-c": [{"age_secs": 60, "value": 99.0}]
            }
        })
    }

    fn setup(snapshot: Value, config: RemediationConfig) -> (Arc<FixtureCloud>, RemediationHandler) {
        let cloud = Arc::new(FixtureCloud::from_json(&snapshot.to_string()).unwrap());
        let handler = RemediationHandler::new(CloudContext::from_shared(cloud.clone()), config);
        (cloud, handler)
    }

    fn group_alarm(group: &str, state: &str) -> Value {
        let message = json!({
            "AlarmName": "asg-high-cpu",
            "NewStateValue": state,
            "Trigger": {
                "MetricName": "CPUUtilization",
                "Dimensions": [{"name": "AutoScalingGroupName", "value": group}]
            }
        });
        json!({"Records": [{"Sns": {"Message": message.to_string()}}]})
    }

    #[tokio::test]
    async fn test_marks_busiest_in_service_instance() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());

        let outcome = handler.handle_alarm(&group_alarm("web-asg", "ALARM")).await.unwrap();
        let RemediationOutcome::Remediated(decision) = outcome else {
            panic!("expected remediation");
        };

        // i-c is busier but not InService
        assert_eq!(decision.instance_id, "i-b");
        assert_eq!(decision.cpu_utilization, Some(85.0));
        assert_eq!(decision.candidates, 3);
        assert_eq!(decision.group_name.as_deref(), Some("web-asg"));
        assert_eq!(decision.action, RemediationAction::MarkUnhealthy);
        // i-d has no datapoints
        assert!(!decision.metrics_complete);

        assert_eq!(
            cloud.recorded_actions(),
            vec![RecordedAction::SetInstanceHealth(HealthMark {
                instance_id: "i-b".into(),
                health_status: HealthStatus::Unhealthy,
                should_respect_grace_period: false,
            })]
        );
    }

    #[tokio::test]
    async fn test_queries_use_ten_minute_average() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());
        handler.handle_alarm(&group_alarm("web-asg", "ALARM")).await.unwrap();

        let queries = cloud.recorded_queries();
        assert_eq!(queries.len(), 3);
        for query in &queries {
            assert_eq!((query.end - query.start).num_seconds(), 600);
            assert_eq!(query.period_secs, 60);
            assert_eq!(query.statistic, Statistic::Average);
        }
        let ids: Vec<_> = queries.iter().filter_map(|q| q.instance_id()).collect();
        assert_eq!(ids, vec!["i-a", "i-b", "i-d"]);
    }

    #[tokio::test]
    async fn test_missing_metrics_count_as_zero() {
        let snapshot = json!({
            "groups": {"quiet": [
                {"instance_id": "i-1", "lifecycle_state": "InService"},
                {"instance_id": "i-2", "lifecycle_state": "InService"}
            ]}
        });
        let (cloud, handler) = setup(snapshot, RemediationConfig::default());

        let outcome = handler.handle_alarm(&group_alarm("quiet", "ALARM")).await.unwrap();
        let RemediationOutcome::Remediated(decision) = outcome else {
            panic!("expected remediation");
        };
        assert_eq!(decision.instance_id, "i-1");
        assert_eq!(decision.cpu_utilization, Some(0.0));
        assert!(!decision.metrics_complete);
        assert_eq!(cloud.recorded_actions().len(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_refuses_blind_selection() {
        let snapshot = json!({
            "groups": {"quiet": [{"instance_id": "i-1", "lifecycle_state": "InService"}]}
        });
        let config = RemediationConfig {
            require_metric_data: true,
            ..Default::default()
        };
        let (cloud, handler) = setup(snapshot, config);

        let failure = handler
            .handle_alarm(&group_alarm("quiet", "ALARM"))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, InvocationStage::Queried);
        assert!(matches!(failure.error, GuardError::NoMetricData { candidates: 1 }));
        assert!(cloud.recorded_actions().is_empty());
    }

    #[tokio::test]
    async fn test_no_in_service_members() {
        let snapshot = json!({
            "groups": {"draining": [{"instance_id": "i-1", "lifecycle_state": "Terminating"}]}
        });
        let (cloud, handler) = setup(snapshot, RemediationConfig::default());

        let result = handler.handle_alarm(&group_alarm("draining", "ALARM")).await;
        let failure = result.as_ref().unwrap_err();
        assert!(matches!(failure.error, GuardError::NoCandidates));
        assert!(cloud.recorded_actions().is_empty());
        assert_eq!(HandlerResponse::from(&result).status_code, 400);
    }

    #[tokio::test]
    async fn test_ok_state_needs_no_action() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());

        let result = handler.handle_alarm(&group_alarm("web-asg", "OK")).await;
        assert!(matches!(result, Ok(RemediationOutcome::NoActionNeeded { .. })));
        assert!(cloud.recorded_queries().is_empty());
        assert!(cloud.recorded_actions().is_empty());
        assert_eq!(HandlerResponse::from(&result).status_code, 200);
    }

    #[tokio::test]
    async fn test_malformed_event_fails_at_parse() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());

        let result = handler.handle_alarm(&json!({"unexpected": true})).await;
        let failure = result.as_ref().unwrap_err();
        assert_eq!(failure.stage, InvocationStage::Parsed);
        assert!(cloud.recorded_actions().is_empty());

        let response = HandlerResponse::from(&result);
        assert_eq!(response.status_code, 400);
        assert!(response.body.starts_with("invalid event"));
    }

    #[tokio::test]
    async fn test_metric_backend_failure() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());
        cloud.fail_metrics(true);

        let result = handler.handle_alarm(&group_alarm("web-asg", "ALARM")).await;
        let failure = result.as_ref().unwrap_err();
        assert_eq!(failure.stage, InvocationStage::Queried);
        assert_eq!(failure.outcome_label(), "backend_failure");
        assert_eq!(HandlerResponse::from(&result).status_code, 500);
        assert!(cloud.recorded_actions().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_group_is_backend_failure() {
        let (_, handler) = setup(web_group(), RemediationConfig::default());
        let failure = handler
            .handle_alarm(&group_alarm("missing-asg", "ALARM"))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            GuardError::Backend(BackendError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_action_failure_reported_at_action_stage() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());
        cloud.fail_actions(true);

        let failure = handler
            .handle_alarm(&group_alarm("web-asg", "ALARM"))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, InvocationStage::ActionIssued);
    }

    #[tokio::test]
    async fn test_direct_instance_is_sole_candidate() {
        let config = RemediationConfig {
            respect_grace_period: true,
            ..Default::default()
        };
        let (cloud, handler) = setup(web_group(), config);

        let outcome = handler.handle_alarm(&json!({"InstanceId": "i-a"})).await.unwrap();
        let RemediationOutcome::Remediated(decision) = outcome else {
            panic!("expected remediation");
        };
        assert_eq!(decision.instance_id, "i-a");
        assert_eq!(decision.candidates, 1);
        assert!(decision.metrics_complete);
        assert_eq!(
            cloud.recorded_actions(),
            vec![RecordedAction::SetInstanceHealth(HealthMark {
                instance_id: "i-a".into(),
                health_status: HealthStatus::Unhealthy,
                should_respect_grace_period: true,
            })]
        );
    }

    #[tokio::test]
    async fn test_reboot_named_instance() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());

        let result = handler
            .handle_reboot(&json!({"detail": {"instance-id": "i-c"}}))
            .await;
        let response = HandlerResponse::from(&result);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "Instance i-c rebooted successfully");
        assert_eq!(
            cloud.recorded_actions(),
            vec![RecordedAction::RebootInstances {
                instance_ids: vec!["i-c".into()]
            }]
        );
        assert!(cloud.recorded_queries().is_empty());
    }

    #[tokio::test]
    async fn test_reboot_rejects_group_target() {
        let (cloud, handler) = setup(web_group(), RemediationConfig::default());
        let result = handler.handle_reboot(&group_alarm("web-asg", "ALARM")).await;
        assert_eq!(HandlerResponse::from(&result).status_code, 400);
        assert!(cloud.recorded_actions().is_empty());
    }

    #[tokio::test]
    async fn test_reboot_unknown_instance() {
        let (_, handler) = setup(web_group(), RemediationConfig::default());
        let result = handler
            .handle_reboot(&json!({"detail": {"instance-id": "i-404"}}))
            .await;
        let response = HandlerResponse::from(&result);
        assert_eq!(response.status_code, 500);
        assert!(response.body.contains("i-404"));
    }

    #[tokio::test]
    async fn test_nan_datapoints_count_as_missing() {
        let member = |id: &str| GroupMember {
            instance_id: id.to_string(),
            lifecycle_state: "InService".to_string(),
        };
        let mut snapshot = CloudSnapshot::default();
        snapshot
            .groups
            .insert("web-asg".to_string(), vec![member("i-a"), member("i-b")]);
        snapshot.cpu.insert(
            "i-a".to_string(),
            vec![FixtureDatapoint { age_secs: 60, value: f64::NAN }],
        );
        snapshot.cpu.insert(
            "i-b".to_string(),
            vec![FixtureDatapoint { age_secs: 60, value: 65.0 }],
        );
        let cloud = Arc::new(FixtureCloud::new(snapshot));
        let handler = RemediationHandler::new(
            CloudContext::from_shared(cloud.clone()),
            RemediationConfig::default(),
        );

        let outcome = handler.handle_alarm(&group_alarm("web-asg", "ALARM")).await.unwrap();
        let RemediationOutcome::Remediated(decision) = outcome else {
            panic!("expected remediation");
        };

        assert_eq!(decision.instance_id, "i-b");
        assert_eq!(decision.cpu_utilization, Some(65.0));
        assert!(!decision.metrics_complete);
    }

    #[tokio::test]
    async fn test_oversized_metric_window_fails_without_action() {
        let config = RemediationConfig {
            metric_window_secs: 10_000_000_000_000_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let (cloud, handler) = setup(web_group(), config);

        let failure = handler
            .handle_alarm(&group_alarm("web-asg", "ALARM"))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, InvocationStage::Queried);
        assert!(matches!(failure.error, GuardError::InvalidConfig(_)));
        let result: InvocationResult = Err(failure);
        assert_eq!(HandlerResponse::from(&result).status_code, 500);
        assert!(cloud.recorded_queries().is_empty());
        assert!(cloud.recorded_actions().is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RemediationConfig::default().validate().is_ok());
        let zero_period = RemediationConfig {
            metric_period_secs: 0,
            ..Default::default()
        };
        assert!(zero_period.validate().is_err());
    }

    #[test]
    fn test_response_serializes_status_code_field() {
        let response = HandlerResponse {
            status_code: 200,
            body: "ok".into(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 200, "body": "ok"})
        );
    }
}
