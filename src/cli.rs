//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand};

use crate::domain::{BackendKind, Secret};

/// Solo Server - run local LLM backends in containers
#[derive(Parser, Debug)]
#[command(name = "solo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never prompt; every question takes its default answer
    #[arg(long, global = true)]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a backend and wait until it is ready
    Start(StartArgs),

    /// Stop a backend's container (it is kept for the next start)
    Stop {
        /// Backend: ollama, vllm, llama.cpp or custom
        #[arg(default_value = "ollama", value_parser = parse_backend)]
        backend: BackendKind,
    },

    /// Show backend containers and their endpoints
    Status {
        /// Only this backend
        #[arg(value_parser = parse_backend)]
        backend: Option<BackendKind>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete a backend's container
    Remove {
        /// Backend: ollama, vllm or llama.cpp
        #[arg(default_value = "ollama", value_parser = parse_backend)]
        backend: BackendKind,
    },

    /// Show the detected hardware profile
    Hardware {
        /// Probe again instead of using the cached profile
        #[arg(long)]
        refresh: bool,
    },

    /// Start a backend unattended and print the URL to benchmark
    BenchmarkSetup {
        /// Backend: ollama, vllm or llama.cpp
        #[arg(default_value = "ollama", value_parser = parse_backend)]
        backend: BackendKind,

        /// Host port
        #[arg(short, long)]
        port: Option<u16>,

        /// Model to serve
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Backend: ollama, vllm, llama.cpp or custom
    #[arg(default_value = "ollama", value_parser = parse_backend)]
    pub backend: BackendKind,

    /// Run on the CPU even when a usable GPU is present
    #[arg(long)]
    pub cpu: bool,

    /// Host port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Model to serve
    #[arg(short, long)]
    pub model: Option<String>,

    /// Replace an existing container (asks first)
    #[arg(long)]
    pub recreate: bool,

    /// Probe the hardware again instead of using the cached profile
    #[arg(long)]
    pub refresh_hardware: bool,

    /// Hugging Face token for gated models
    #[arg(long, env = "HUGGING_FACE_TOKEN", hide_env_values = true, value_parser = parse_secret)]
    pub hf_token: Option<Secret>,

    /// Endpoint of an externally managed OpenAI-compatible API
    #[arg(long)]
    pub api_url: Option<String>,

    /// Key for the external API
    #[arg(long, value_parser = parse_secret)]
    pub api_key: Option<Secret>,
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    value.parse()
}

fn parse_secret(value: &str) -> Result<Secret, String> {
    Secret::new(value).ok_or_else(|| "value must not be empty".to_string())
}
