use clap::Parser;
use roi_timeseries::{handle_generate_config, init_logging, print_startup_error, BatchCli, RoiTimeseries};
use std::process;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = BatchCli::parse();
    init_logging(cli.common.verbose, cli.common.quiet);

    if cli.common.generate_config {
        return handle_generate_config(&cli.common, "batch_extract <root_data_dir> <atlas_path>");
    }

    let (root, atlas) = match cli.paths() {
        Ok(paths) => paths,
        Err(e) => return print_startup_error(&cli.common, &e),
    };

    let app = match cli
        .load_config()
        .and_then(|config| RoiTimeseries::from_common(&cli.common, config))
    {
        Ok(app) => app,
        Err(e) => return print_startup_error(&cli.common, &e),
    };

    match app.run_batch(
        root,
        atlas,
        cli.extraction.mask.as_deref(),
        cli.output_dir.as_deref(),
        cli.report.as_deref(),
    ) {
        Ok(report) => report.exit_code(),
        Err(e) => {
            app.handle_error(&e);
            e.exit_code()
        }
    }
}
