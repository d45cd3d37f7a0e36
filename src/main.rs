use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kiln::api;
use kiln::cli::{Cli, Command};
use kiln::config::{self, Config};
use kiln::reporter::{ConsoleReporter, Reporter};
use kiln::workflow::provision::{CommandProvisioner, Provisioner};
use kiln::workflow::runner::Runner;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("kiln=debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("kiln=info".parse().expect("valid log directive"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    let mut config = config::load_config(&cli.config)?;

    match cli.command {
        Command::Build { keep_vm, no_image } => {
            if keep_vm {
                config.builder.no_delete_vm = true;
            }
            if no_image {
                config.builder.no_create_image = true;
            }
            run_build(&config).await?;
        }
        Command::Validate => {
            println!("Config [{}] is valid", cli.config.display());
            print_plan(&config);
        }
        Command::Destroy => run_destroy(&config).await?,
    }

    Ok(())
}

async fn run_build(config: &Config) -> miette::Result<()> {
    let client = api::Client::new(&config.api.endpoint)?;
    let reporter = ConsoleReporter;
    let provisioner = config.provision.command.as_ref().map(|command| {
        Box::new(CommandProvisioner::new(command.clone())) as Box<dyn Provisioner>
    });

    let summary = Runner::new(config, &client, &reporter, provisioner)
        .run()
        .await?;

    match summary.image {
        Some(image) => reporter.say(&format!("Build finished, image [{image}] is ready")),
        None => reporter.say("Build finished, no image was created"),
    }
    Ok(())
}

async fn run_destroy(config: &Config) -> miette::Result<()> {
    let client = api::Client::new(&config.api.endpoint)?;
    let reporter = ConsoleReporter;

    reporter.say(&format!(
        "Logging in to the VM API at [{}]",
        config.api.endpoint
    ));
    let token = client.login(&config.api.user, &config.api.password).await?;

    reporter.say(&format!(
        "Purging builder VM [{}] and its configuration",
        config.builder.vm_name
    ));
    client.purge_vm(&token, &config.builder.vm_name).await?;
    reporter.say("Builder VM purged");
    Ok(())
}

fn print_plan(config: &Config) {
    println!("  endpoint:  {}", config.api.endpoint);
    if config.builder.no_create_image {
        println!("  image:     {} (no image will be created)", config.image.source);
    } else if config.image.precopy {
        println!(
            "  image:     {} -> {} (pre-copy, commit after provisioning)",
            config.image.source, config.image.destination
        );
    } else {
        println!(
            "  image:     {} -> {} (save after provisioning)",
            config.image.source, config.image.destination
        );
    }
    println!(
        "  builder:   {} ({} cores)",
        config.builder.vm_name, config.builder.cpu_cores
    );
    if config.builder.no_delete_vm {
        println!("  builder VM is kept after the run");
    }
    match &config.provision.command {
        Some(command) => println!("  provision: {command}"),
        None => println!("  provision: none"),
    }
}
