//! Configuration document to deployment target to manifest.

use kdeploy_core::{
    build_manifest, DeployConfig, DeployError, DocumentFormat, ExposureType, Protocol,
};

const DOCUMENT: &str = r#"{
  "package": { "name": "ingest", "version": "0.9.2" },
  "kubectl": { "kubeconfig": "/etc/kdeploy/kubeconfig" },
  "monitor": { "max_polls": 30 },
  "cluster": {
    "environments": {
      "production": {
        "project": "acme-prod",
        "cluster_name": "edge",
        "cluster_zone": "us-east1-c",
        "image_prefix": "gcr.io/acme-prod/"
      }
    }
  },
  "orchestration": {
    "services": {
      "production": [
        { "name": "syslog", "type": "HostPort", "container_port": 514, "host_port": 514, "protocol": "UDP" },
        { "name": "ingest-nodes", "type": "NodePort", "container_port": 7000 },
        { "type": "HostPort", "container_port": 9000, "host_port": 9000 }
      ]
    },
    "variables": {
      "production": { "LOG_FORMAT": "json", "SHARD_COUNT": 4, "otel_service_name": "ingest" }
    },
    "host_volumes": {
      "production": [
        { "name": "spool", "source": "/var/spool/ingest", "target": "/spool" }
      ]
    },
    "resources": {
      "production": {
        "requests": { "cpu": "250m", "memory": "256Mi" },
        "limits": { "memory": "512Mi" }
      }
    }
  }
}"#;

fn config() -> DeployConfig {
    DeployConfig::parse(DOCUMENT, DocumentFormat::Json).unwrap()
}

#[test]
fn sections_override_defaults() {
    let config = config();
    assert_eq!(config.kubectl.kubeconfig, "/etc/kdeploy/kubeconfig");
    assert_eq!(config.kubectl.binary, "kubectl");
    assert_eq!(config.monitor.max_polls, 30);
    assert_eq!(config.monitor.poll_interval.as_secs(), 10);
}

#[test]
fn target_describes_environment() {
    let target = config().target("production").unwrap();

    assert_eq!(target.environment, "production");
    assert_eq!(target.cluster.project, "acme-prod");
    assert_eq!(target.cluster.name, "edge");
    assert_eq!(target.cluster.zone, "us-east1-c");

    assert_eq!(target.exposures.len(), 1);
    assert_eq!(target.exposures[0].name, "ingest-nodes");
    assert_eq!(target.exposures[0].kind, ExposureType::NodePort);
    assert_eq!(target.exposures[0].public_port, None);
}

#[test]
fn manifest_from_configuration() {
    let spec = config().workload_spec("production").unwrap();
    let doc = build_manifest(&spec);
    let container = doc.container().unwrap();

    assert_eq!(doc.name(), "ingest");
    assert_eq!(container.image, "gcr.io/acme-prod/ingest:0.9.2");
    assert_eq!(doc.spec.replicas, 2);

    // Unnamed HostPort entry is dropped
    assert_eq!(container.ports.len(), 2);
    assert_eq!(container.ports[0].host_port, Some(514));
    assert_eq!(container.ports[0].protocol, Some(Protocol::Udp));
    assert_eq!(container.ports[1].container_port, 7000);
    assert_eq!(container.ports[1].host_port, None);

    let env: Vec<_> = container
        .env
        .iter()
        .map(|v| (v.name.as_str(), v.value.as_str()))
        .collect();
    assert_eq!(
        env,
        vec![
            ("LOG_FORMAT", "json"),
            ("SHARD_COUNT", "4"),
            ("otel_service_name", "ingest"),
        ]
    );

    assert_eq!(container.volume_mounts[0].mount_path, "/spool");
    assert_eq!(doc.spec.template.spec.volumes[0].host_path.path, "/var/spool/ingest");

    assert_eq!(container.resources.requests["cpu"], "250m");
    assert_eq!(container.resources.limits["memory"], "512Mi");
    assert!(container.readiness_probe.is_none());
    assert!(doc.spec.template.spec.node_selector.is_empty());
}

#[test]
fn rendered_yaml_matches_payload() {
    let doc = build_manifest(&config().workload_spec("production").unwrap());
    let yaml = doc.to_yaml().unwrap();
    let json = doc.to_json().unwrap();

    let from_yaml: serde_json::Value = serde_yaml::from_str(&yaml).unwrap();
    let from_json: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(from_yaml, from_json);
    assert_eq!(from_json["apiVersion"], "apps/v1");
    assert_eq!(from_json["spec"]["selector"]["matchLabels"]["app"], "ingest");
}

#[test]
fn unknown_environment_is_configuration_error() {
    let err = config().target("staging").unwrap_err();
    assert!(matches!(err, DeployError::Configuration(_)));
}

#[test]
fn environment_names_match_exactly() {
    let document = DOCUMENT.replace("\"production\"", "\"Production\"");
    let config = DeployConfig::parse(&document, DocumentFormat::Json).unwrap();

    assert!(config.target("production").is_err());
    let spec = config.workload_spec("Production").unwrap();
    assert!(spec.env.unwrap().contains_key("LOG_FORMAT"));
}
