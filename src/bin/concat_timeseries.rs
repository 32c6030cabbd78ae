use clap::Parser;
use roi_timeseries::{handle_generate_config, init_logging, print_startup_error, ConcatCli, RoiTimeseries};
use std::process;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = ConcatCli::parse();
    init_logging(cli.common.verbose, cli.common.quiet);

    if cli.common.generate_config {
        return handle_generate_config(&cli.common, "concat_timeseries <data_dir>");
    }

    let data_dir = match cli.data_dir() {
        Ok(dir) => dir,
        Err(e) => return print_startup_error(&cli.common, &e),
    };

    let app = match cli
        .load_config()
        .and_then(|config| RoiTimeseries::from_common(&cli.common, config))
    {
        Ok(app) => app,
        Err(e) => return print_startup_error(&cli.common, &e),
    };

    match app.run_concat(data_dir, &cli.output_dir, &cli.exclude_runs) {
        Ok(report) => report.exit_code(),
        Err(e) => {
            app.handle_error(&e);
            e.exit_code()
        }
    }
}
