use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    error::{Error, Result},
    filter::AttributeFilter,
    method::MatchMethod,
};

#[derive(Debug, Parser)]
#[command(
    name = "gazetteer",
    about = "A retrieval engine for named features in gazetteers"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a gazetteer from a JSON record file (replaces prior contents)
    Load(LoadArgs),
    /// Retrieve candidate features for a name
    Search(SearchArgs),
    /// Look up a single feature by identifier
    Find(FindArgs),
    /// List filterable attributes, or the known values of one attribute
    Attributes(AttributesArgs),
    /// Show data locations and per-gazetteer statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Load --

#[derive(Debug, Parser)]
pub struct LoadArgs {
    /// Gazetteer name (e.g. geonames)
    pub gazetteer: String,

    /// Path to a JSON array of records
    pub path: PathBuf,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The name to search for
    pub query: String,

    /// Gazetteer to search
    #[arg(short = 'g', long)]
    pub gazetteer: String,

    /// Match strategy
    #[arg(short = 'm', long, default_value = "exact")]
    pub method: String,

    /// Maximum number of features to return
    #[arg(short = 'n', long, default_value = "1000")]
    pub limit: usize,

    /// Number of top score groups to keep (ignored by exact)
    #[arg(short = 'r', long, default_value = "1")]
    pub ranks: usize,

    /// Attribute filter clause, attr=value (repeat for OR values and
    /// further attributes)
    #[arg(short = 'f', long = "filter", value_name = "ATTR=VALUE")]
    pub filters: Vec<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn method(&self) -> Result<MatchMethod> {
        self.method.parse()
    }

    /// Fold repeated `attr=value` clauses into a filter; repeated
    /// attributes accumulate alternative values.
    pub fn filter(&self) -> Result<Option<AttributeFilter>> {
        if self.filters.is_empty() {
            return Ok(None);
        }

        let mut filter = AttributeFilter::new();
        for clause in &self.filters {
            let (attr, value) = clause.split_once('=').ok_or_else(|| {
                Error::Config(format!(
                    "invalid filter clause '{clause}': expected ATTR=VALUE"
                ))
            })?;
            if attr.is_empty() {
                return Err(Error::Config(format!(
                    "invalid filter clause '{clause}': empty attribute"
                )));
            }
            filter
                .entry(attr.to_string())
                .or_default()
                .push(value.to_string());
        }
        Ok(Some(filter))
    }
}

// -- Find --

#[derive(Debug, Parser)]
pub struct FindArgs {
    /// Feature identifier
    pub identifier: String,

    /// Gazetteer to look in
    #[arg(short = 'g', long)]
    pub gazetteer: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Attributes --

#[derive(Debug, Parser)]
pub struct AttributesArgs {
    /// Gazetteer to inspect
    #[arg(short = 'g', long)]
    pub gazetteer: String,

    /// List the known values of this attribute instead of the attribute
    /// names
    pub attribute: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Restrict to one gazetteer
    #[arg(short = 'g', long)]
    pub gazetteer: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "gazetteer",
            &mut std::io::stdout(),
        );
    }
}
