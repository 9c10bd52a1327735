use std::future::Future;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use crate::app::{AppController, BackendStatus, StartRequest};
use crate::cli::{Commands, StartArgs};
use crate::domain::{DomainError, HardwareProfile};

/// Run one CLI command. Results go to stdout, progress to stderr.
///
/// `interrupt` is only awaited by commands that start containers.
pub async fn execute(
    controller: &AppController,
    command: Commands,
    interrupt: impl Future<Output = ()>,
) -> Result<(), DomainError> {
    let orchestrator = controller.orchestrator();
    match command {
        Commands::Start(args) => {
            let report = orchestrator.start(start_request(args), interrupt).await?;
            println!("{}", report.endpoint);
        }
        Commands::Stop { backend } => {
            orchestrator.stop(backend).await?;
        }
        Commands::Status { backend, json } => {
            let statuses = orchestrator.status(backend).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                println!("{}", status_table(&statuses));
            }
        }
        Commands::Remove { backend } => {
            orchestrator.remove(backend).await?;
        }
        Commands::Hardware { refresh } => {
            let profile = orchestrator.hardware(refresh);
            println!("{}", hardware_table(&profile));
        }
        Commands::BenchmarkSetup {
            backend,
            port,
            model,
        } => {
            let url = orchestrator
                .benchmark_setup(backend, port, model, interrupt)
                .await?;
            println!("{}", url);
        }
    }
    Ok(())
}

fn start_request(args: StartArgs) -> StartRequest {
    StartRequest {
        force_cpu: args.cpu,
        port: args.port,
        model: args.model,
        recreate: args.recreate,
        refresh_hardware: args.refresh_hardware,
        hf_token: args.hf_token,
        api_url: args.api_url,
        api_key: args.api_key,
        ..StartRequest::new(args.backend)
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

fn hardware_table(profile: &HardwareProfile) -> Table {
    let mut table = new_table(&["Component", "Detected"]);
    let gpu_memory = if profile.gpu_memory_mib > 0.0 {
        format!("{:.1} GiB", profile.gpu_memory_mib / 1024.0)
    } else {
        "-".to_string()
    };
    let rows = [
        ("Operating system", profile.os.to_string()),
        ("CPU", profile.cpu_model.clone()),
        ("CPU threads", profile.cpu_cores.to_string()),
        ("Memory", format!("{:.1} GiB", profile.memory_gib)),
        ("GPU vendor", profile.gpu_vendor.to_string()),
        ("GPU model", profile.gpu_model.clone()),
        ("GPU memory", gpu_memory),
        (
            "Compute capability",
            profile
                .gpu_compute_capability
                .map(|cc| format!("{:.1}", cc))
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Recommended backend", profile.recommended_backend.to_string()),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    table
}

fn status_table(statuses: &[BackendStatus]) -> Table {
    let mut table = new_table(&["Backend", "Container", "State", "Endpoint"]);
    for status in statuses {
        let state = status
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "external".to_string());
        table.add_row(vec![
            Cell::new(status.backend.to_string()),
            Cell::new(status.handle.as_deref().unwrap_or("-")),
            Cell::new(state),
            Cell::new(status.endpoint.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendKind, ContainerState};
    use crate::ports::HardwareDetector;
    use crate::testing::FixedHardware;

    #[test]
    fn test_hardware_table_lists_gpu() {
        let rendered = hardware_table(&FixedHardware::nvidia().detect()).to_string();

        assert!(rendered.contains("NVIDIA GeForce RTX 4090"));
        assert!(rendered.contains("24.0 GiB"));
        assert!(rendered.contains("8.9"));
    }

    #[test]
    fn test_status_table_marks_external_backends() {
        let statuses = vec![
            BackendStatus {
                backend: BackendKind::Ollama,
                handle: Some("solo-ollama".to_string()),
                state: Some(ContainerState::Running),
                endpoint: Some("http://localhost:11434".to_string()),
            },
            BackendStatus {
                backend: BackendKind::CustomApi,
                handle: None,
                state: None,
                endpoint: None,
            },
        ];
        let rendered = status_table(&statuses).to_string();

        assert!(rendered.contains("solo-ollama"));
        assert!(rendered.contains("http://localhost:11434"));
        assert!(rendered.contains("external"));
    }

    #[test]
    fn test_status_json_shape() {
        let statuses = vec![BackendStatus {
            backend: BackendKind::LlamaCpp,
            handle: Some("solo-llamacpp".to_string()),
            state: Some(ContainerState::Stopped),
            endpoint: None,
        }];
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&statuses).unwrap()).unwrap();

        assert_eq!(json[0]["backend"], "llama_cpp");
        assert_eq!(json[0]["handle"], "solo-llamacpp");
        assert!(json[0]["endpoint"].is_null());
    }

    #[test]
    fn test_start_flags_reach_request() {
        use clap::Parser;

        let cli = crate::cli::Cli::try_parse_from([
            "solo", "start", "vllm", "--cpu", "--port", "9000", "--recreate",
        ])
        .unwrap();
        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };
        let request = start_request(args);

        assert_eq!(request.kind, BackendKind::Vllm);
        assert!(request.force_cpu);
        assert!(request.recreate);
        assert_eq!(request.port, Some(9000));
        assert!(!request.unattended);
    }
}
