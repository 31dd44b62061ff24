use crate::prelude::{println, *};
use colored::Colorize;
use doctriage_core::{HintsAggregate, ToolName, ToolRequest, ToolResult};

#[derive(Debug, clap::Args, Clone)]
pub struct AnalyzeOptions {
    /// PDF to analyze: a path, file:// URL or http(s):// URL
    reference: String,

    /// Run only this tool (repeatable). All tools run when omitted.
    #[arg(short, long = "tool", value_name = "NAME")]
    tools: Vec<String>,

    /// Print a summary table instead of JSON
    #[arg(long)]
    table: bool,
}

/// Turn tool names from the command line into requests.
pub fn requests_from_names(names: &[String]) -> Result<Vec<ToolRequest>> {
    if names.is_empty() {
        return Ok(ToolRequest::all());
    }
    names
        .iter()
        .map(|name| {
            let tool: ToolName = name.parse().map_err(Error::from)?;
            Ok(ToolRequest::new(tool))
        })
        .collect()
}

pub async fn run(options: AnalyzeOptions, global: crate::Global) -> Result<()> {
    let requests = requests_from_names(&options.tools)?;
    let session = crate::session::Session::from_global(&global)?;

    let aggregate = session
        .analyze(&options.reference, requests)
        .await
        .map_err(Error::from)?;

    if options.table {
        print_table(&aggregate);
    } else {
        let json = serde_json::to_string_pretty(&aggregate)
            .map_err(|e| eyre!("JSON serialization failed: {}", e))?;
        println!("{}", json);
    }

    Ok(())
}

fn print_table(aggregate: &HintsAggregate) {
    let mut table = crate::prelude::new_table();
    table.set_titles(prettytable::row!["Tool", "OK", "Confidence", "Time", "Summary"]);

    for (tool, result) in aggregate.iter() {
        let status = if result.success {
            "✓".green()
        } else {
            "✗".red()
        };
        table.add_row(prettytable::row![
            tool.as_str(),
            status,
            f!("{:.2}", result.confidence),
            f!("{} ms", result.execution_time_ms),
            summary(result),
        ]);
    }

    table.printstd();
    println!(
        "\n{} succeeded, {} failed",
        aggregate.succeeded().to_string().green(),
        aggregate.failed().to_string().red()
    );
}

/// The error for failed tools, the hint message otherwise.
fn summary(result: &ToolResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    result
        .hints
        .as_ref()
        .and_then(|hints| hints.get("message"))
        .and_then(|message| message.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn list_tools() -> Result<()> {
    let mut table = crate::prelude::new_table();
    table.set_titles(prettytable::row!["Name", "Description"]);
    for tool in ToolName::ALL {
        table.add_row(prettytable::row![tool.as_str().cyan(), tool.description()]);
    }
    table.printstd();
    Ok(())
}
