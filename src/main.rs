//! vLLM Operator - lifecycle controller for vLLM model runtimes

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vllm_operator::config::{AdapterKind, OperatorConfig};
use vllm_operator::controller::{error_policy, reconcile, Context};
use vllm_operator::crd::VllmRuntime;
use vllm_operator::service::RuntimeService;
use vllm_operator::store::{DeclarativeRuntimeStore, KubeObjectStore, ObjectStore};
use vllm_operator::template::{
    DeploymentParams, FileTemplateResolver, RuntimeTemplate, TemplateResolver,
};

/// vLLM Operator - CRD-driven lifecycle controller for vLLM model runtimes
#[derive(Parser, Debug)]
#[command(name = "vllm-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Settings shared by every mode
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Directory holding `{model}.yaml` templates
    #[arg(long, global = true, env = "VLLM_TEMPLATE_DIR", default_value = vllm_operator::DEFAULT_TEMPLATE_DIR)]
    template_dir: PathBuf,

    /// Namespace used for direct lifecycle commands
    #[arg(short, long, global = true, env = "VLLM_NAMESPACE", default_value = vllm_operator::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Control plane implementation (cluster, http)
    #[arg(long, global = true, env = "VLLM_ADAPTER", default_value = "cluster")]
    adapter: AdapterKind,

    /// Base URL of the remote vLLM control API (http adapter)
    #[arg(long, global = true, env = "VLLM_CONTROL_ENDPOINT")]
    control_endpoint: Option<String>,
}

impl GlobalArgs {
    fn to_config(&self) -> OperatorConfig {
        OperatorConfig {
            template_dir: self.template_dir.clone(),
            namespace: self.namespace.clone(),
            control_endpoint: self.control_endpoint.clone(),
            adapter: self.adapter,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the VLLM CRD, then watches VLLM objects in all namespaces and
    /// drives each one towards its declared action.
    Controller,

    /// Start a runtime
    Start(RuntimeArgs),

    /// Stop a runtime
    Stop(RuntimeArgs),

    /// Roll out new deployment parameters to a running runtime
    Update(RuntimeArgs),

    /// Show the current status of a runtime
    Status(RuntimeArgs),

    /// List VLLM objects in the namespace
    List {
        /// Only show runtimes reporting phase Running
        #[arg(long)]
        running: bool,
    },

    /// Render a VLLM manifest from deployment parameters
    Render(RenderArgs),
}

/// Identity of the runtime a direct command acts on
#[derive(Args, Debug)]
struct RuntimeArgs {
    /// Name of the VLLM object
    runtime_name: String,

    /// Served model
    model: String,
}

/// Deployment parameters for `render`
#[derive(Args, Debug)]
struct RenderArgs {
    /// Object name
    #[arg(long)]
    name: String,

    /// Served model
    #[arg(long)]
    model: String,

    /// Logical runtime name (defaults to the object name)
    #[arg(long)]
    runtime_name: Option<String>,

    /// Location of the model weights
    #[arg(long, default_value = "")]
    storage_uri: String,

    /// GPU device IDs, comma separated
    #[arg(long, value_delimiter = ',')]
    device_ids: Vec<String>,

    /// Fraction of GPU memory vLLM may use
    #[arg(long, default_value = "0.9")]
    gpu_memory_utilization: f64,

    /// Maximum context length
    #[arg(long, default_value = "4096")]
    max_model_len: u32,

    /// Tensor parallel degree
    #[arg(long, default_value = "1")]
    tensor_parallel_size: u32,

    /// Report prompt token details
    #[arg(long)]
    enable_prompt_token_stats: bool,

    /// Serving replicas
    #[arg(long, default_value = "1")]
    replicas: i32,

    /// Write the manifest here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML
        let crd = serde_yaml::to_string(&VllmRuntime::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = cli.global.to_config();

    match cli.command {
        Some(Commands::Controller) | None => run_controller(config).await,
        Some(Commands::Render(args)) => run_render(args, &config),
        Some(command) => run_command(command, config).await,
    }
}

/// Ensure the VLLM CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply so
/// the schema always matches the operator version.
async fn ensure_crd_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    tracing::info!("Installing VLLM CRD...");
    crds.patch("vllms.vllm.ai", &params, &Patch::Apply(&VllmRuntime::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install VLLM CRD: {}", e))?;

    tracing::info!("VLLM CRD installed/updated");
    Ok(())
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    config.validate()?;
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client, &config.field_manager).await?;

    tracing::info!(
        adapter = %config.adapter,
        template_dir = %config.template_dir.display(),
        "Starting VLLM controller..."
    );

    let runtimes: Api<VllmRuntime> = Api::all(client.clone());
    let ctx = Arc::new(Context::for_cluster(client, config)?);

    Controller::new(runtimes, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Runtime reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Runtime reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("VLLM controller shut down");
    Ok(())
}

/// Run a direct lifecycle command and print the result as JSON
async fn run_command(command: Commands, config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let objects: Arc<dyn ObjectStore> =
        Arc::new(KubeObjectStore::new(client, &config.field_manager));
    let templates: Arc<dyn TemplateResolver> =
        Arc::new(FileTemplateResolver::new(&config.template_dir));
    let control_plane = config.control_plane(templates.clone(), objects.clone())?;
    let store = Arc::new(DeclarativeRuntimeStore::new(templates, objects));
    let service = RuntimeService::new(store, control_plane);

    let ns = config.namespace.as_str();
    let output = match command {
        Commands::Start(rt) => {
            serde_json::to_string_pretty(&service.start(ns, &rt.runtime_name, &rt.model).await?)?
        }
        Commands::Stop(rt) => {
            serde_json::to_string_pretty(&service.stop(ns, &rt.runtime_name, &rt.model).await?)?
        }
        Commands::Update(rt) => {
            serde_json::to_string_pretty(&service.update(ns, &rt.runtime_name, &rt.model).await?)?
        }
        Commands::Status(rt) => serde_json::to_string_pretty(
            &service.get_status(ns, &rt.runtime_name, &rt.model).await?,
        )?,
        Commands::List { running: true } => {
            serde_json::to_string_pretty(&service.list_running(ns).await?)?
        }
        Commands::List { running: false } => {
            serde_json::to_string_pretty(&service.list(ns).await?)?
        }
        Commands::Controller | Commands::Render(_) => {
            anyhow::bail!("not a lifecycle command")
        }
    };

    println!("{output}");
    Ok(())
}

fn run_render(args: RenderArgs, config: &OperatorConfig) -> anyhow::Result<()> {
    let params = DeploymentParams {
        runtime_name: args.runtime_name.unwrap_or_else(|| args.name.clone()),
        name: args.name,
        namespace: config.namespace.clone(),
        model: args.model,
        storage_uri: args.storage_uri,
        device_ids: args.device_ids,
        gpu_memory_utilization: args.gpu_memory_utilization,
        max_model_len: args.max_model_len,
        tensor_parallel_size: args.tensor_parallel_size,
        enable_prompt_token_stats: args.enable_prompt_token_stats,
        replicas: args.replicas,
    };
    let yaml = RuntimeTemplate::from_params(&params).to_yaml()?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, yaml)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
            tracing::info!(path = %path.display(), "wrote VLLM manifest");
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
