use crate::prelude::{println, *};
use colored::Colorize;
use doctriage_core::validation::{self, Country};

#[derive(Debug, clap::Parser)]
#[command(name = "validate")]
#[command(about = "Validate identifiers read from documents")]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Check a Social Insurance Number
    #[clap(name = "sin")]
    Sin {
        /// Nine digits; spaces and dashes are ignored
        value: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a postal code
    #[clap(name = "postal-code")]
    PostalCode {
        code: String,

        /// CA or US
        #[arg(long, default_value = "CA", value_parser = parse_country)]
        country: Country,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check an email address
    #[clap(name = "email")]
    Email {
        address: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a North American phone number
    #[clap(name = "phone")]
    Phone {
        number: String,

        /// CA or US
        #[arg(long, default_value = "CA", value_parser = parse_country)]
        country: Country,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_country(s: &str) -> std::result::Result<Country, String> {
    s.parse()
}

pub fn run(app: App) -> Result<()> {
    let (valid, shown, reason, json) = match app.command {
        Commands::Sin { value, json } => {
            let check = validation::validate_sin(&value);
            let shown = check.formatted.clone().unwrap_or(check.normalized.clone());
            let output = serde_json::to_string_pretty(&check)?;
            (check.valid, shown, check.reason, json.then_some(output))
        }
        Commands::PostalCode {
            code,
            country,
            json,
        } => {
            let check = validation::validate_postal_code(&code, country);
            let output = serde_json::to_string_pretty(&check)?;
            (check.valid, check.normalized, check.reason, json.then_some(output))
        }
        Commands::Email { address, json } => {
            let check = validation::validate_email(&address);
            let output = serde_json::to_string_pretty(&check)?;
            (check.valid, check.normalized, check.reason, json.then_some(output))
        }
        Commands::Phone {
            number,
            country,
            json,
        } => {
            let check = validation::validate_phone(&number, country);
            let shown = check.formatted.clone().unwrap_or(number);
            let output = serde_json::to_string_pretty(&check)?;
            (check.valid, shown, check.reason, json.then_some(output))
        }
    };

    match json {
        Some(output) => println!("{}", output),
        None if valid => println!("{} {}", "✓".green(), shown),
        None => println!(
            "{} {}: {}",
            "✗".red(),
            shown,
            reason.unwrap_or_default()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_subcommands() {
        let app = App::try_parse_from(["validate", "postal-code", "h2x 1y4", "--country", "us"])
            .unwrap();
        match app.command {
            Commands::PostalCode { code, country, .. } => {
                assert_eq!(code, "h2x 1y4");
                assert_eq!(country, Country::UnitedStates);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let app = App::try_parse_from(["validate", "postal-code", "H2X1Y4"]).unwrap();
        assert!(matches!(
            app.command,
            Commands::PostalCode {
                country: Country::Canada,
                ..
            }
        ));

        assert!(App::try_parse_from(["validate", "postal-code", "x", "--country", "FR"]).is_err());
    }

    #[test]
    fn test_parse_email_and_phone() {
        let app = App::try_parse_from(["validate", "phone", "514 555 1234", "--country", "US"])
            .unwrap();
        assert!(matches!(
            app.command,
            Commands::Phone {
                country: Country::UnitedStates,
                json: false,
                ..
            }
        ));

        let app = App::try_parse_from(["validate", "email", "jane@example.ca", "--json"]).unwrap();
        assert!(run(app).is_ok());
    }

    #[test]
    fn test_run_sin() {
        let app = App::try_parse_from(["validate", "sin", "130-692-544", "--json"]).unwrap();
        assert!(run(app).is_ok());
    }
}
