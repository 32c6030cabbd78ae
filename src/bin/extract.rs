use clap::Parser;
use roi_timeseries::{handle_generate_config, init_logging, print_startup_error, ExtractCli, RoiTimeseries};
use std::process;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = ExtractCli::parse();
    init_logging(cli.common.verbose, cli.common.quiet);

    if cli.common.generate_config {
        return handle_generate_config(&cli.common, "extract <input_4d> <atlas_3d> <output_csv>");
    }

    let (input, atlas, output) = match cli.paths() {
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

    match app.run_single(input, atlas, output, cli.extraction.mask.as_deref()) {
        Ok(_) => 0,
        Err(e) => {
            app.handle_error(&e);
            e.exit_code()
        }
    }
}
