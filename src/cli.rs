use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "putevod")]
#[command(author, version, about = "Telegram storefront for .kmz map point packs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot and the Mini App API server
    Run,

    /// Validate the catalog file and list its products
    CheckCatalog {
        /// Path to the catalog JSON (defaults to CATALOG_PATH)
        #[arg(short, long)]
        path: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
