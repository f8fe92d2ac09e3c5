//! aqsol-rs CLI for datasets, relevance attribution, head training and
//! embedding analysis.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::module::AutodiffModule;
use burn_ndarray::NdArrayDevice;
use clap::{Parser, Subcommand, ValueEnum};
use ndarray::Array1;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aqsol_analysis::{ClusterConfig, EmbeddingReport};
use aqsol_core::backend::{Autodiff, NdArray};
use aqsol_core::{array2_to_tensor, array4_to_tensor, tensor_to_array2, tensor_to_vec, Seed, Split};
use aqsol_data::{
    read_attention_npz, read_embeddings_npy, read_labels_npy, read_tokens_json, train_test_split,
    write_array1_npy, write_array2_npy, AqSolDataset, CombiSoluDataset, EmbeddingDataset,
    EmbeddingLoaders, SmilesTokenizer,
};
use aqsol_explain::{AttentionRelevance, ExplainConfig, MoleculeHighlight, RelevanceObserver};
use aqsol_models::{
    CheckpointMetadata, HeadCheckpoint, HeadConfig, MaskedBackward, MaskedHead,
    MaskedLinearRegressionHead, MaskedLinearRegressionHeadConfig, MaskedRegressionHead,
    MaskedRegressionHeadConfig, SignFilter,
};
use aqsol_train::{evaluate, HeadTrainer, HeadTrainerConfig, RegressionMetrics, TrainOutput};

/// Backend type for training and attribution.
type TrainBackend = Autodiff<NdArray>;

/// Weights file stem inside a checkpoint directory.
const HEAD_FILE: &str = "head";
/// Metadata file inside a checkpoint directory.
const META_FILE: &str = "head.json";

#[derive(Parser)]
#[command(name = "aqsol")]
#[command(author, version)]
#[command(about = "Attribution and regression heads for transformer solubility models")]
#[command(long_about = "aqsol-rs: relevance propagation, masked regression heads and embedding analysis.

Attention/gradient stacks and embeddings are produced by the encoder and
read from .npz/.npy files.

EXAMPLES:
  # Inspect a dataset
  aqsol dataset info --csv AqueousSolu.csv

  # Token-level relevance for one molecule
  aqsol relevance --attention mol0.npz --smiles 'CCO' --exp -0.77 --pred -0.52

  # Fit a masked MLP head on embeddings
  aqsol train --embeddings train_x.npy --labels train_y.npy --head mlp --output runs/mlp

  # Input gradients restricted to the selected feature
  aqsol attribute --checkpoint runs/mlp --embeddings test_x.npy --output grads.npy

  # PCA + k-means report
  aqsol cluster --valid valid_x.npy --test test_x.npy --output report.json")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect datasets and tokenisation
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },
    /// Propagate attention relevance for one molecule
    Relevance {
        /// .npz with `attn` and `grad` arrays of shape (L, H, S, S)
        #[arg(long, value_name = "FILE")]
        attention: PathBuf,

        /// SMILES of the molecule (tokenised here)
        #[arg(long, conflicts_with = "tokens")]
        smiles: Option<String>,

        /// JSON list of tokens, used instead of --smiles
        #[arg(long, value_name = "FILE")]
        tokens: Option<PathBuf>,

        /// Attention mask length including the leading register token
        /// [default: token count + 1]
        #[arg(long, value_name = "N")]
        mask_len: Option<usize>,

        /// Experimental logS for the caption
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        exp: f32,

        /// Predicted logS for the caption
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        pred: f32,

        /// ExplainConfig JSON
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write heatmaps into this directory
        #[arg(long, value_name = "DIR")]
        heatmaps: Option<PathBuf>,

        /// Output highlight JSON
        #[arg(long, default_value = "highlight.json", value_name = "FILE")]
        output: PathBuf,
    },
    /// Fit a regression head on precomputed embeddings
    Train {
        /// Training embeddings (N, D)
        #[arg(long, value_name = "FILE")]
        embeddings: PathBuf,

        /// Training labels (N,)
        #[arg(long, value_name = "FILE")]
        labels: PathBuf,

        /// Validation embeddings; without them a random hold-out is used
        #[arg(long, value_name = "FILE", requires = "valid_labels")]
        valid_embeddings: Option<PathBuf>,

        /// Validation labels
        #[arg(long, value_name = "FILE", requires = "valid_embeddings")]
        valid_labels: Option<PathBuf>,

        /// Hold-out fraction when no validation files are given
        #[arg(long, default_value = "0.1")]
        valid_ratio: f32,

        /// Head architecture
        #[arg(long, value_enum, default_value = "mlp")]
        head: HeadKind,

        /// Hidden width of the MLP head
        #[arg(long, default_value = "64")]
        hidden: usize,

        /// Sign filter of the linear head: pos, neg or all
        #[arg(long, default_value = "all")]
        sign: SignFilter,

        /// Fixed feature ids stored with the head (comma separated)
        #[arg(long, value_delimiter = ',')]
        feature_ids: Vec<usize>,

        /// Number of training epochs
        #[arg(long, default_value = "25", value_name = "N")]
        epochs: usize,

        /// Learning rate for Adam optimizer
        #[arg(long, default_value = "0.001", value_name = "LR")]
        lr: f64,

        /// Batch size for training
        #[arg(long, default_value = "64", value_name = "SIZE")]
        batch_size: usize,

        /// Early stopping patience (0 = disabled)
        #[arg(long, default_value = "0")]
        patience: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        /// Output directory for the checkpoint and metrics
        #[arg(long, default_value = "./runs", value_name = "DIR")]
        output: PathBuf,
    },
    /// Masked input gradients of a trained head
    Attribute {
        /// Checkpoint directory written by `train`
        #[arg(long, value_name = "DIR")]
        checkpoint: PathBuf,

        /// Embeddings (N, D)
        #[arg(long, value_name = "FILE")]
        embeddings: PathBuf,

        /// Feature ids overriding the ranking heuristic (comma separated)
        #[arg(long, value_delimiter = ',')]
        feature_ids: Vec<usize>,

        /// Output .npy for the input gradients
        #[arg(long, default_value = "grads.npy", value_name = "FILE")]
        output: PathBuf,

        /// Also write predictions to this .npy
        #[arg(long, value_name = "FILE")]
        predictions: Option<PathBuf>,
    },
    /// PCA and k-means over validation and test embeddings
    Cluster {
        /// Validation embeddings (PCA and k-means are fitted here)
        #[arg(long, value_name = "FILE")]
        valid: PathBuf,

        /// Validation labels
        #[arg(long, value_name = "FILE")]
        valid_labels: Option<PathBuf>,

        /// Test embeddings
        #[arg(long, value_name = "FILE")]
        test: PathBuf,

        /// Test labels
        #[arg(long, value_name = "FILE")]
        test_labels: Option<PathBuf>,

        /// PCA components
        #[arg(long, default_value = "2")]
        components: usize,

        /// Number of clusters
        #[arg(long, default_value = "4")]
        clusters: usize,

        /// Test molecules listed per cluster
        #[arg(long, default_value = "10")]
        neighbors: usize,

        /// Random seed
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        /// Output report JSON
        #[arg(long, default_value = "report.json", value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Show dataset info
    Info {
        /// CSV file
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,

        /// CSV layout
        #[arg(long, value_enum, default_value = "aqsol")]
        kind: DatasetKind,

        /// Fraction of rows in the training partition
        #[arg(long, default_value = "0.8")]
        ratio: f64,
    },
    /// Tokenise a SMILES string
    Tokens {
        /// SMILES
        smiles: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HeadKind {
    /// LayerNorm + three-layer MLP
    Mlp,
    /// Single linear layer with a sign filter
    Linear,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DatasetKind {
    /// AqueousSolu: `smiles solute`, `logS_aq_avg`
    Aqsol,
    /// CombiSolu: solute, solvent, temperature, density, logS
    Combisolu,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Dataset { command } => handle_dataset(command),
        Commands::Relevance {
            attention,
            smiles,
            tokens,
            mask_len,
            exp,
            pred,
            config,
            heatmaps,
            output,
        } => handle_relevance(RelevanceArgs {
            attention,
            smiles,
            tokens,
            mask_len,
            exp,
            pred,
            config,
            heatmaps,
            output,
        }),
        Commands::Train {
            embeddings,
            labels,
            valid_embeddings,
            valid_labels,
            valid_ratio,
            head,
            hidden,
            sign,
            feature_ids,
            epochs,
            lr,
            batch_size,
            patience,
            seed,
            output,
        } => {
            let valid = valid_embeddings.zip(valid_labels);
            let head = head_config(head, hidden, sign, feature_ids);
            let trainer = HeadTrainerConfig::default()
                .with_n_epochs(epochs)
                .with_lr(lr)
                .with_early_stopping(patience);
            handle_train(
                &embeddings,
                &labels,
                valid,
                valid_ratio,
                head,
                trainer,
                batch_size,
                Seed::new(seed),
                &output,
            )
        }
        Commands::Attribute {
            checkpoint,
            embeddings,
            feature_ids,
            output,
            predictions,
        } => handle_attribute(&checkpoint, &embeddings, &feature_ids, &output, predictions),
        Commands::Cluster {
            valid,
            valid_labels,
            test,
            test_labels,
            components,
            clusters,
            neighbors,
            seed,
            output,
        } => {
            let config = ClusterConfig {
                n_components: components,
                n_clusters: clusters,
                n_neighbors: neighbors,
                seed: Seed::new(seed),
            };
            handle_cluster(&valid, valid_labels, &test, test_labels, &config, &output)
        }
    }
}

fn handle_dataset(command: DatasetCommands) -> Result<()> {
    match command {
        DatasetCommands::Info { csv, kind, ratio } => {
            println!("Dataset: {}", csv.display());
            println!("─────────────────────────────────────────");
            match kind {
                DatasetKind::Aqsol => {
                    let train = AqSolDataset::from_csv(&csv, Split::Train, ratio)
                        .with_context(|| format!("Failed to load '{}'", csv.display()))?;
                    let valid = AqSolDataset::from_csv(&csv, Split::Valid, ratio)?;
                    println!("  Layout:         AqueousSolu");
                    println!("  logS range:     [{:.2}, {:.2}]", train.min(), train.max());
                    print_partition(train.len(), valid.len(), ratio);
                }
                DatasetKind::Combisolu => {
                    let train = CombiSoluDataset::from_csv(&csv, Split::Train, ratio, false)
                        .with_context(|| format!("Failed to load '{}'", csv.display()))?;
                    let valid = CombiSoluDataset::from_csv(&csv, Split::Valid, ratio, false)?;
                    println!("  Layout:         CombiSolu");
                    println!("  logS range:     [{:.2}, {:.2}]", train.min(), train.max());
                    print_partition(train.len(), valid.len(), ratio);
                }
            }
            Ok(())
        }
        DatasetCommands::Tokens { smiles } => {
            let tokens = SmilesTokenizer::new()
                .tokenize(&smiles)
                .with_context(|| format!("Failed to tokenise '{smiles}'"))?;
            println!("{}", serde_json::to_string(&tokens)?);
            Ok(())
        }
    }
}

fn print_partition(n_train: usize, n_valid: usize, ratio: f64) {
    println!("  Split ratio:    {ratio}");
    println!();
    println!("  Train samples:  {n_train}");
    println!("  Valid samples:  {n_valid}");
    println!("  Total samples:  {}", n_train + n_valid);
}

struct RelevanceArgs {
    attention: PathBuf,
    smiles: Option<String>,
    tokens: Option<PathBuf>,
    mask_len: Option<usize>,
    exp: f32,
    pred: f32,
    config: Option<PathBuf>,
    heatmaps: Option<PathBuf>,
    output: PathBuf,
}

fn handle_relevance(args: RelevanceArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ExplainConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?,
        None => ExplainConfig::default(),
    };
    if let Some(dir) = args.heatmaps {
        config = config.with_heatmaps(dir);
    }

    let (smiles, tokens) = match (args.smiles, args.tokens) {
        (Some(smiles), _) => {
            let tokens = SmilesTokenizer::new().tokenize(&smiles)?;
            (smiles, tokens)
        }
        (None, Some(path)) => {
            let tokens = read_tokens_json(&path)
                .with_context(|| format!("Failed to read tokens '{}'", path.display()))?;
            (tokens.concat(), tokens)
        }
        (None, None) => bail!("Either --smiles or --tokens is required"),
    };

    let (attn, grad) = read_attention_npz(&args.attention)
        .with_context(|| format!("Failed to read '{}'", args.attention.display()))?;
    let mask_len = args.mask_len.unwrap_or(tokens.len() + 1);

    let device = NdArrayDevice::Cpu;
    let attn = array4_to_tensor::<NdArray>(&attn, &device);
    let grad = array4_to_tensor::<NdArray>(&grad, &device);

    let engine = AttentionRelevance::from_config(&config);
    let weights = match config.heatmap_writer() {
        Some(mut writer) => {
            let observer: &mut dyn RelevanceObserver = &mut writer;
            engine.compute_observed(attn, grad, mask_len, &tokens, observer)?
        }
        None => engine.compute(attn, grad, mask_len)?,
    };

    let mapper = config.color_mapper()?;
    let highlight = MoleculeHighlight::new(&mapper, smiles, tokens, &weights, args.exp, args.pred)?;
    highlight.save(&args.output)?;

    println!("{}", highlight.label);
    println!("  Tokens:     {}", highlight.tokens.len());
    println!("  Atoms:      {}", highlight.atom_weights.len());
    println!("  Saved to:   {}", args.output.display());
    if config.save_heatmap {
        println!("  Heatmaps:   {}", config.heatmap_dir.display());
    }
    Ok(())
}

fn head_config(kind: HeadKind, hidden: usize, sign: SignFilter, feature_ids: Vec<usize>) -> HeadConfig {
    let ids = (!feature_ids.is_empty()).then_some(feature_ids);
    // dim is filled in once the embeddings are read
    match kind {
        HeadKind::Mlp => HeadConfig::Mlp(MaskedRegressionHeadConfig {
            hidden,
            feature_ids: ids,
            ..Default::default()
        }),
        HeadKind::Linear => HeadConfig::Linear(MaskedLinearRegressionHeadConfig {
            sign,
            feature_ids: ids,
            ..Default::default()
        }),
    }
}

fn with_dim(head: HeadConfig, dim: usize) -> HeadConfig {
    match head {
        HeadConfig::Mlp(c) => HeadConfig::Mlp(MaskedRegressionHeadConfig { dim, ..c }),
        HeadConfig::Linear(c) => HeadConfig::Linear(MaskedLinearRegressionHeadConfig { dim, ..c }),
    }
}

fn load_dataset(x: &Path, y: &Path) -> Result<EmbeddingDataset> {
    let x = read_embeddings_npy(x).with_context(|| format!("Failed to read '{}'", x.display()))?;
    let y = read_labels_npy(y).with_context(|| format!("Failed to read '{}'", y.display()))?;
    Ok(EmbeddingDataset::from_arrays(x, Some(y))?)
}

#[allow(clippy::too_many_arguments)]
fn handle_train(
    embeddings: &Path,
    labels: &Path,
    valid: Option<(PathBuf, PathBuf)>,
    valid_ratio: f32,
    head: HeadConfig,
    trainer_config: HeadTrainerConfig,
    batch_size: usize,
    seed: Seed,
    output: &Path,
) -> Result<()> {
    let full = load_dataset(embeddings, labels)?;
    let (train, valid) = match valid {
        Some((x, y)) => (full, load_dataset(&x, &y)?),
        None => train_test_split(&full, valid_ratio, seed.derive("holdout"))
            .context("Failed to hold out a validation set")?,
    };
    let head = with_dim(head, train.dim());

    println!("=== aqsol-rs Training ===\n");
    println!("Configuration:");
    println!("  Head:          {}", head.kind());
    println!("  Embedding dim: {}", head.dim());
    println!("  Train samples: {}", train.len());
    println!("  Valid samples: {}", valid.len());
    println!("  Epochs:        {}", trainer_config.n_epochs);
    println!("  Learning rate: {}", trainer_config.lr);
    println!("  Batch size:    {batch_size}");
    println!("  Seed:          {}\n", seed.value());

    let dls = EmbeddingLoaders::builder(train, valid)
        .batch_size(batch_size)
        .seed(seed)
        .build()
        .context("Failed to create dataloaders")?;

    std::fs::create_dir_all(output)?;
    let device = NdArrayDevice::Cpu;
    let trainer = HeadTrainer::<TrainBackend>::new(trainer_config, NdArrayDevice::Cpu);

    let (meta, metrics) = match &head {
        HeadConfig::Mlp(config) => {
            let model: MaskedRegressionHead<TrainBackend> = config.init(&device);
            let out = trainer.fit_with_forward(model, &dls, |m, x| m.forward(x), |m, x| m.forward(x))?;
            let inner = out.model.clone().valid();
            let metrics = evaluate(dls.valid(), &device, |x| inner.forward(x))?;
            out.model.save_checkpoint(output.join(HEAD_FILE))?;
            (checkpoint_metadata(&head, &out, seed), metrics)
        }
        HeadConfig::Linear(config) => {
            let model: MaskedLinearRegressionHead<TrainBackend> = config.init(&device);
            let out = trainer.fit_with_forward(model, &dls, |m, x| m.forward(x), |m, x| m.forward(x))?;
            let inner = out.model.clone().valid();
            let metrics = evaluate(dls.valid(), &device, |x| inner.forward(x))?;
            out.model.save_checkpoint(output.join(HEAD_FILE))?;
            (checkpoint_metadata(&head, &out, seed), metrics)
        }
    };

    meta.save(output.join(META_FILE))?;
    metrics.save(output.join("metrics.json"))?;
    print_metrics(&metrics);
    println!("\nCheckpoint saved to: {}", output.display());
    Ok(())
}

fn checkpoint_metadata<M>(head: &HeadConfig, out: &TrainOutput<M>, seed: Seed) -> CheckpointMetadata {
    CheckpointMetadata::new(head.clone())
        .with_epoch(out.best_epoch)
        .with_val_loss(out.best_valid_loss)
        .with_extra("seed", seed.value().to_string())
}

fn print_metrics(metrics: &RegressionMetrics) {
    println!("\nValidation ({} molecules):", metrics.n);
    println!("  MAE:  {:.4}", metrics.mae);
    println!("  RMSE: {:.4}", metrics.rmse);
    println!("  R2:   {:.4}", metrics.r2);
}

fn handle_attribute(
    checkpoint: &Path,
    embeddings: &Path,
    feature_ids: &[usize],
    output: &Path,
    predictions: Option<PathBuf>,
) -> Result<()> {
    let meta = CheckpointMetadata::load(checkpoint.join(META_FILE))
        .with_context(|| format!("No checkpoint metadata in '{}'", checkpoint.display()))?;
    let x = read_embeddings_npy(embeddings)
        .with_context(|| format!("Failed to read '{}'", embeddings.display()))?;
    if x.ncols() != meta.head.dim() {
        bail!(
            "Embeddings have width {} but the {} head expects {}",
            x.ncols(),
            meta.head.kind(),
            meta.head.dim()
        );
    }

    let device = NdArrayDevice::Cpu;
    let weights = checkpoint.join(HEAD_FILE);
    let overrides = (!feature_ids.is_empty()).then_some(feature_ids);
    let input = array2_to_tensor::<TrainBackend>(&x, &device);

    let result: MaskedBackward<NdArray> = match &meta.head {
        HeadConfig::Mlp(config) => {
            let head: MaskedRegressionHead<TrainBackend> =
                config.init(&device).load_checkpoint(&weights, &device)?;
            let ids = head.feature_ids(overrides)?;
            println!("Feature ids: {ids:?}");
            head.attribute(input, Some(ids.as_slice()))?
        }
        HeadConfig::Linear(config) => {
            let head: MaskedLinearRegressionHead<TrainBackend> =
                config.init(&device).load_checkpoint(&weights, &device)?;
            println!("Sign filter: {}", head.sign());
            head.attribute(input, overrides)?
        }
    };

    write_array2_npy(output, &tensor_to_array2(result.input_grad)?)?;
    println!("Input gradients saved to: {}", output.display());

    if let Some(path) = predictions {
        let preds = Array1::from(tensor_to_vec(result.prediction)?);
        write_array1_npy(&path, &preds)?;
        println!("Predictions saved to: {}", path.display());
    }
    Ok(())
}

fn handle_cluster(
    valid: &Path,
    valid_labels: Option<PathBuf>,
    test: &Path,
    test_labels: Option<PathBuf>,
    config: &ClusterConfig,
    output: &Path,
) -> Result<()> {
    let read_labels = |path: Option<PathBuf>| -> Result<Option<Array1<f32>>> {
        path.map(|p| {
            read_labels_npy(&p).with_context(|| format!("Failed to read '{}'", p.display()))
        })
        .transpose()
    };

    let valid_x = read_embeddings_npy(valid)
        .with_context(|| format!("Failed to read '{}'", valid.display()))?;
    let test_x = read_embeddings_npy(test)
        .with_context(|| format!("Failed to read '{}'", test.display()))?;
    let valid_y = read_labels(valid_labels)?;
    let test_y = read_labels(test_labels)?;

    let report = EmbeddingReport::build(&valid_x, valid_y.as_ref(), &test_x, test_y.as_ref(), config)?;
    report.save(output)?;

    println!("Explained variance: {}", report.axis_labels().join(", "));
    for (cluster, members) in report.neighbors.iter().enumerate() {
        println!("  Cluster {cluster}: nearest test molecules {members:?}");
    }
    println!("Report saved to: {}", output.display());
    Ok(())
}
