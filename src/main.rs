use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use radioportrait::builder::ModelBuilder;
use radioportrait::geom::{self, PortraitAxes};
use radioportrait::logging::init_logging;
use radioportrait::output;
use radioportrait::problem::{BarMonitor, Problem};
use radioportrait::result::Portrait;
use radioportrait::server;
use radioportrait::settings::{self, CliArgs, Command, Settings, SolveArgs};

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let settings = settings::load_config(&args)?;
    init_logging(&settings.log_filter)?;

    match &args.command {
        Command::Serve(_) => {
            info!("{}", settings);
            let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
            runtime.block_on(server::serve(&settings))
        }
        Command::Solve(solve_args) => solve(solve_args, &settings),
    }
}

fn solve(args: &SolveArgs, settings: &Settings) -> Result<()> {
    let start = Instant::now();
    let coords = geom::load_obj(&args.mesh)?;
    let num_triangles = coords.len() / 9;

    let model = ModelBuilder::new()
        .coordinates(coords)
        .visibility(vec![true; num_triangles])
        .direction(args.direction)
        .band(args.band)
        .polarization(args.tx, args.rx)
        .axes(PortraitAxes {
            azimuth: args.azimuth,
            range: args.range,
            elevation: args.elevation,
        })
        .ground_plane(args.ground_plane)
        .build()?;
    info!(
        triangles = num_triangles,
        nodes = model.nodes.len(),
        edges = model.edges.len(),
        l_max = model.l_max,
        band = %model.wave.band,
        "model built"
    );

    let problem = Problem::new(model, settings.job.max_grid_cells)?;
    let monitor = BarMonitor::new(problem.grid.total());
    let image = problem.solve(&monitor)?;
    monitor.finish();

    let portrait = Portrait::extract(&image.view(), &problem.model, settings.job.crop_margin);
    let result = portrait.into_message(0);
    println!("{}", output::summary(&result));
    if let Some(path) = &args.output {
        output::write_portrait(&result, path)?;
        println!("Written to {}", path.display());
    }

    println!("Time taken: {:.2?}", start.elapsed());
    Ok(())
}
