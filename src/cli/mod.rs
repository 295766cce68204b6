//! BK-009: CLI subcommands (generate, validate, init).

use crate::core::codegen::SqlOptions;
use crate::core::error::Result as BakeryResult;
use crate::core::export::{ExportConfig, ExportGenerator};
use crate::core::files;
use crate::core::parser::{self, ConfigOverrides};
use crate::core::recipe::RecipeContext;
use crate::core::resolver::RecipeManager;
use crate::core::types::{BakeryConfig, SqlDialect};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bake every recipe into SQL files plus a named-ID metadata file
    Generate(GenerateArgs),

    /// Load and resolve every recipe without writing anything
    Validate(ValidateArgs),

    /// Initialize a new data-bakery project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Path to data-bakery.yaml (default: ./data-bakery.yaml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Directory containing recipe files
    #[arg(short, long)]
    pub recipes_dir: Option<PathBuf>,

    /// Directory receiving the SQL files
    #[arg(short = 'd', long)]
    pub output_dir: Option<PathBuf>,

    /// Metadata file name, relative to the output directory
    #[arg(long)]
    pub metadata_output: Option<PathBuf>,

    /// Number output files starting at this value
    #[arg(short = 'p', long)]
    pub output_prefix_start: Option<u64>,

    /// SQL dialect to emit
    #[arg(short, long, value_enum)]
    pub sql_dialect: Option<SqlDialect>,

    /// Maximum rows per INSERT statement
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Remove stale files from the output directory first
    #[arg(long)]
    pub empty_output_dir: bool,
}

impl GenerateArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            recipes_dir: self.recipes_dir.clone(),
            output_dir: self.output_dir.clone(),
            metadata_output: self.metadata_output.clone(),
            output_prefix_start: self.output_prefix_start,
            sql_dialect: self.sql_dialect,
            batch_size: self.batch_size,
            empty_output_dir: self.empty_output_dir,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Path to data-bakery.yaml (default: ./data-bakery.yaml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Directory containing recipe files
    #[arg(short, long)]
    pub recipes_dir: Option<PathBuf>,

    /// SQL dialect to emit
    #[arg(short, long, value_enum)]
    pub sql_dialect: Option<SqlDialect>,
}

impl ValidateArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            recipes_dir: self.recipes_dir.clone(),
            sql_dialect: self.sql_dialect,
            ..ConfigOverrides::default()
        }
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Generate(args) => {
            init_logging(args.debug);
            cmd_generate(&args)
        }
        Commands::Validate(args) => {
            init_logging(args.debug);
            cmd_validate(&args)
        }
        Commands::Init { path } => cmd_init(&path),
    }
}

/// Install the stderr log subscriber. `RUST_LOG` applies unless `--debug`.
fn init_logging(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    // A second install (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Config, context, and resolver for a run.
struct Prepared {
    config: BakeryConfig,
    context: RecipeContext,
    manager: RecipeManager,
}

/// Load and merge the config, check it, and build the resolver.
fn prepare(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    require_output_dir: bool,
) -> BakeryResult<Prepared> {
    let mut config = parser::load_config(config_path)?;
    parser::apply_overrides(&mut config, overrides);
    parser::check_config(&config, require_output_dir)?;

    let dialect = config.sql_dialect.unwrap_or_default();
    let context = RecipeContext::new(dialect, &config.recipe_context);
    let origin = config_path.unwrap_or(Path::new(parser::DEFAULT_CONFIG_FILE));
    let manager = RecipeManager::new(parser::build_manager_config(&config, &context, origin)?);

    Ok(Prepared {
        config,
        context,
        manager,
    })
}

fn cmd_generate(args: &GenerateArgs) -> Result<(), String> {
    let written = run_generate(args).map_err(|e| e.to_string())?;
    println!("Exported {} recipe(s)", written);
    Ok(())
}

fn run_generate(args: &GenerateArgs) -> BakeryResult<usize> {
    let Prepared {
        config,
        context,
        manager,
    } = prepare(args.config.as_deref(), &args.overrides(), true)?;
    let options = parser::resolve_options(&config)?;

    files::prepare_output_dir(&options.output_dir, options.empty_output_dir)?;
    let recipe_paths = files::get_recipe_file_paths(&options.recipes_dir)?;
    if recipe_paths.is_empty() {
        tracing::warn!(dir = %options.recipes_dir.display(), "no recipe files found");
    }
    tracing::info!(
        recipes = recipe_paths.len(),
        output = %options.output_dir.display(),
        dialect = %options.sql_dialect,
        "generating"
    );

    let mut generator = ExportGenerator::new(
        recipe_paths,
        manager,
        ExportConfig {
            output_dir: options.output_dir.clone(),
            context,
            sql: SqlOptions {
                batch_size: options.batch_size,
                dialect: options.sql_dialect,
            },
            start_prefix: options.output_prefix_start,
        },
    );
    let written = generator.export_all_recipes()?;
    generator.export_metadata_file(&options.metadata_path())?;
    Ok(written.len())
}

fn cmd_validate(args: &ValidateArgs) -> Result<(), String> {
    let (recipes, named_ids) = run_validate(args).map_err(|e| e.to_string())?;
    println!("OK: {} recipe(s), {} named ID(s)", recipes, named_ids);
    Ok(())
}

fn run_validate(args: &ValidateArgs) -> BakeryResult<(usize, usize)> {
    let Prepared {
        config,
        context,
        manager,
    } = prepare(args.config.as_deref(), &args.overrides(), false)?;

    let recipes_dir = config.recipes_dir.clone().unwrap_or_default();
    let recipe_paths = files::get_recipe_file_paths(&recipes_dir)?;

    let mut generator = ExportGenerator::new(
        recipe_paths.clone(),
        manager,
        ExportConfig {
            output_dir: config.output_dir.clone().unwrap_or_default(),
            context,
            sql: SqlOptions {
                batch_size: config.batch_size,
                dialect: config.sql_dialect.unwrap_or_default(),
            },
            start_prefix: config.output_prefix_start,
        },
    );
    for path in &recipe_paths {
        generator.bake_recipe(path)?;
        tracing::debug!(recipe = %path.display(), "ok");
    }

    let named_ids = generator
        .manager()
        .get_generated_named_ids()
        .values()
        .map(|names| names.len())
        .sum();
    Ok((recipe_paths.len(), named_ids))
}

const CONFIG_TEMPLATE: &str = r#"# data-bakery configuration. Command-line flags override these values.
recipes_dir: recipes
output_dir: output
empty_output_dir: false
metadata_output: exports.json
output_prefix_start: 1
sql_dialect: mysql
# batch_size: 500

# Available to recipes as {{context.KEY}}
recipe_context: {}

# Columns merged under every row of a table, e.g.
#   user:
#     created_at: !raw NOW()
table_defaults: {}

# First ID per table (default 1)
table_start_ids: {}
"#;

const RECIPE_TEMPLATE: &str = r#"user:
  - id: !auto_inc
    email: hi@there.com
    created_at: !raw NOW()
  - id: !named_id admin
    email: admin@there.com

orders:
  - id: !auto_inc
    user_id: !ref user.admin
    note: "seeded for {{context.sql_dialect}}"
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join(parser::DEFAULT_CONFIG_FILE);
    let recipes_dir = path.join("recipes");
    let recipe_path = recipes_dir.join("example.yaml");

    for existing in [&config_path, &recipe_path] {
        if existing.exists() {
            return Err(format!("{} already exists", existing.display()));
        }
    }

    std::fs::create_dir_all(&recipes_dir)
        .map_err(|e| format!("cannot create recipes dir: {}", e))?;
    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;
    std::fs::write(&recipe_path, RECIPE_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", recipe_path.display(), e))?;

    println!("Initialized data-bakery project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", recipe_path.display());
    Ok(())
}
