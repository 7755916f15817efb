use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "gatehouse", about = "Session tokens and billing webhook ingestion")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,
}
