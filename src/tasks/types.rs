use std::collections::HashMap;

use bollard::secret::PortMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task. Serialized on the wire as its integer index
/// (0=Pending .. 4=Failed), matching the public API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending = 0,
    Scheduled = 1,
    Running = 2,
    Completed = 3,
    Failed = 4,
}

impl Serialize for State {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(State::Pending),
            1 => Ok(State::Scheduled),
            2 => Ok(State::Running),
            3 => Ok(State::Completed),
            4 => Ok(State::Failed),
            other => Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Unsigned(u64::from(other)),
                &"a task state index in 0..=4",
            )),
        }
    }
}

/// A declarative description of one container the system should run, plus
/// the fields observed as it progresses (container ID, host ports, timings).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct Task {
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "ContainerID")]
    pub container_id: Option<String>,
    pub name: String,
    pub state: State,
    pub image: String,
    pub cpu: f64,
    pub memory: u64,
    pub disk: u64,
    /// Runtime-assigned publish mappings, filled in by observation.
    pub host_ports: Option<PortMap>,
    pub exposed_ports: HashMap<String, HashMap<(), ()>>,
    pub port_bindings: HashMap<String, String>,
    pub restart_policy: String,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub health_check: String,
    pub restart_count: u32,
}

impl Default for Task {
    fn default() -> Self {
        Task {
            id: Uuid::new_v4(),
            container_id: None,
            name: String::new(),
            state: State::Pending,
            image: String::new(),
            cpu: 0.0,
            memory: 0,
            disk: 0,
            host_ports: None,
            exposed_ports: HashMap::new(),
            port_bindings: HashMap::new(),
            restart_policy: String::new(),
            start_time: None,
            finish_time: None,
            health_check: String::new(),
            restart_count: 0,
        }
    }
}

/// An immutable intent record asking the system to move a task to a target
/// state. The sole interchange between client and manager, and between
/// manager and worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct TaskEvent {
    #[serde(rename = "ID")]
    pub id: Uuid,
    pub state: State,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl Default for TaskEvent {
    fn default() -> Self {
        TaskEvent {
            id: Uuid::new_v4(),
            state: State::Pending,
            timestamp: Utc::now(),
            task: Task::default(),
        }
    }
}

/// Container configuration handed to the runtime adapter, derived from a
/// task's declarative spec.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub name: String,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub exposed_ports: HashMap<String, HashMap<(), ()>>,
    pub cmd: Vec<String>,
    pub image: String,
    pub cpu: f64,
    pub memory: i64,
    pub disk: i64,
    pub env: Vec<String>,
    pub restart_policy: String,
}

pub fn new_config(task: &Task) -> Config {
    Config {
        name: task.name.clone(),
        exposed_ports: task.exposed_ports.clone(),
        image: task.image.clone(),
        cpu: task.cpu,
        memory: task.memory as i64,
        disk: task.disk as i64,
        restart_policy: task.restart_policy.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::secret::PortBinding;

    #[test]
    fn state_serializes_as_integer_index() {
        assert_eq!(serde_json::to_string(&State::Pending).unwrap(), "0");
        assert_eq!(serde_json::to_string(&State::Scheduled).unwrap(), "1");
        assert_eq!(serde_json::to_string(&State::Running).unwrap(), "2");
        assert_eq!(serde_json::to_string(&State::Completed).unwrap(), "3");
        assert_eq!(serde_json::to_string(&State::Failed).unwrap(), "4");
    }

    #[test]
    fn state_deserializes_from_integer_index() {
        let state: State = serde_json::from_str("2").unwrap();
        assert_eq!(state, State::Running);
        assert!(serde_json::from_str::<State>("5").is_err());
        assert!(serde_json::from_str::<State>("\"Running\"").is_err());
    }

    #[test]
    fn new_task_defaults_to_pending() {
        let task = Task::default();
        assert_eq!(task.state, State::Pending);
        assert!(task.container_id.is_none());
        assert_eq!(task.restart_count, 0);
    }

    #[test]
    fn task_wire_names_are_pascal_case() {
        let mut task = Task {
            name: "hello-1".to_string(),
            image: "strm/helloworld-http".to_string(),
            ..Default::default()
        };
        task.container_id = Some("abc123".to_string());
        task.exposed_ports.insert("80/tcp".to_string(), HashMap::new());

        let value = serde_json::to_value(&task).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "ID",
            "ContainerID",
            "Name",
            "State",
            "Image",
            "Memory",
            "Disk",
            "HostPorts",
            "ExposedPorts",
            "PortBindings",
            "RestartPolicy",
            "StartTime",
            "FinishTime",
            "HealthCheck",
            "RestartCount",
        ] {
            assert!(obj.contains_key(key), "missing wire field {key}");
        }
        assert_eq!(value["ExposedPorts"]["80/tcp"], serde_json::json!({}));
    }

    #[test]
    fn task_round_trips_through_json() {
        let mut task = Task {
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            state: State::Running,
            ..Default::default()
        };
        task.start_time = Some(Utc::now());
        task.host_ports = Some(PortMap::from([(
            "80/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("49153".to_string()),
            }]),
        )]));

        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.state, State::Running);
        let ports = back.host_ports.unwrap();
        let bindings = ports["80/tcp"].as_ref().unwrap();
        assert_eq!(bindings[0].host_port.as_deref(), Some("49153"));
    }

    #[test]
    fn event_with_unknown_field_is_rejected() {
        let body = serde_json::json!({
            "ID": Uuid::new_v4(),
            "State": 2,
            "Task": { "Name": "web" },
            "Bogus": true,
        });
        assert!(serde_json::from_value::<TaskEvent>(body).is_err());
    }

    #[test]
    fn event_tolerates_missing_optional_fields() {
        // Clients may omit Timestamp and most task fields; intake fills them.
        let body = serde_json::json!({
            "ID": Uuid::new_v4(),
            "State": 2,
            "Task": { "ID": Uuid::new_v4(), "Name": "web", "Image": "nginx" },
        });
        let event: TaskEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.state, State::Running);
        assert_eq!(event.task.state, State::Pending);
    }

    #[test]
    fn config_is_derived_from_the_task() {
        let mut task = Task {
            name: "api".to_string(),
            image: "strm/helloworld-http".to_string(),
            memory: 128 * 1024 * 1024,
            disk: 1,
            cpu: 0.5,
            restart_policy: "always".to_string(),
            ..Default::default()
        };
        task.exposed_ports.insert("80/tcp".to_string(), HashMap::new());

        let config = new_config(&task);
        assert_eq!(config.name, "api");
        assert_eq!(config.image, "strm/helloworld-http");
        assert_eq!(config.memory, 128 * 1024 * 1024);
        assert_eq!(config.cpu, 0.5);
        assert_eq!(config.restart_policy, "always");
        assert!(config.exposed_ports.contains_key("80/tcp"));
        assert!(config.env.is_empty());
    }
}
