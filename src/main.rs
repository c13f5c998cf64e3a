use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use iafiscal_asientos::config::AppConfig;
use iafiscal_asientos::export::export_file_name;
use iafiscal_asientos::ingest::{Document, InvoiceRequest};
use iafiscal_asientos::server::{self, AppState};
use iafiscal_asientos::Asiento;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "iafiscal", version, about = "Asientos contables PGC a partir de facturas")]
struct Cli {
    /// TOML configuration file (default: iafiscal.toml if present)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,

    /// Generate the asiento of one invoice and print it as JSON
    Generate {
        #[arg(long)]
        fecha: String,
        #[arg(long)]
        concepto: String,
        /// Gross amount, "242.00" or "242,00"
        #[arg(long)]
        importe: String,
        /// VAT rate: 0.21, 21, 21% or a category name
        #[arg(long = "tipo-iva")]
        tipo_iva: Option<String>,
        /// Invoice number, used by rule concept patterns
        #[arg(long = "numero-factura")]
        numero_factura: Option<String>,
        /// Supplier or customer name, used by rule concept patterns
        #[arg(long)]
        proveedor: Option<String>,
    },

    /// Read a JSON array of asientos and write the Contasol CSV
    Export {
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Read an invoice document (PDF, image, JSON, CSV) and write the Contasol CSV
    Process {
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Output file (default: stdout, or {cliente}_{periodo}.csv when both are given)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
    /// Client the export belongs to
    #[arg(long, requires = "periodo")]
    cliente: Option<String>,
    /// Accounting period, e.g. 2024-01
    #[arg(long, requires = "cliente")]
    periodo: Option<String>,
}

impl OutputArgs {
    fn path(self) -> Option<PathBuf> {
        match (self.output, self.cliente, self.periodo) {
            (Some(path), _, _) => Some(path),
            (None, Some(client), Some(period)) => Some(PathBuf::from(export_file_name(&client, &period))),
            _ => None,
        }
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_with_dotenv(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(&config),
        Command::Generate {
            fecha,
            concepto,
            importe,
            tipo_iva,
            numero_factura,
            proveedor,
        } => {
            let state = AppState::from_config(&config)?;
            let request = InvoiceRequest {
                fecha: Some(fecha),
                concepto: Some(concepto),
                importe: Some(Value::String(importe)),
                tipo_iva: tipo_iva.map(Value::String),
                numero_factura,
                proveedor,
            };
            let asiento = state.generator.generate_auto(&request.into_line()?)?;
            println!("{}", serde_json::to_string_pretty(&asiento)?);
            Ok(())
        }
        Command::Export { input, output } => {
            let state = AppState::from_config(&config)?;
            let asientos: Vec<Asiento> = serde_json::from_slice(&fs::read(&input)?)?;
            write_output(output.path(), &state.exporter.export(&asientos)?)
        }
        Command::Process { input, output } => {
            let state = AppState::from_config(&config)?;
            let file_name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let document = Document::new(file_name, None, fs::read(&input)?);

            let lines = state.ingestor.ingest(&document)?;
            let asientos = state.generator.generate_all(&lines)?;
            write_output(output.path(), &state.exporter.export(&asientos)?)
        }
    }
}

fn write_output(output: Option<PathBuf>, bytes: &[u8]) -> CliResult<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing export");
            Box::new(fs::File::create(path)?)
        }
        None => Box::new(io::stdout()),
    };
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}
