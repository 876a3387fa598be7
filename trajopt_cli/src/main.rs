//! Solve one trajectory request from a JSON file and write the resulting
//! trajectory next to it.

use std::io::Write;

use serde::Deserialize;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use trajopt_core::{
    PathConstraint, RobotParams, SamplingParams, TrajectoryOptimizer, Waypoint,
};

#[derive(Debug, Deserialize)]
struct SolveRequest {
    waypoints: Vec<Waypoint>,
    #[serde(default)]
    constraints: Vec<PathConstraint>,
    #[serde(default)]
    robot_params: RobotParams,
    #[serde(flatten)]
    sampling: SamplingParams,
    #[serde(default)]
    control_effort_weight: f64,
}

fn main() {
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: trajopt_cli <request.json>");
            std::process::exit(2);
        }
    };

    let request_json = std::fs::read_to_string(&path).unwrap();
    let request: SolveRequest = serde_json::from_str(&request_json).unwrap();

    let optimizer = match TrajectoryOptimizer::new(request.robot_params, request.sampling) {
        Ok(mut optimizer) => {
            optimizer.control_effort_weight = request.control_effort_weight;
            optimizer
        }
        Err(err) => {
            eprintln!("invalid request: {err}");
            std::process::exit(1);
        }
    };

    println!("Solving trajectory through {} waypoints...", request.waypoints.len());
    let result = match optimizer.solve(&request.waypoints, &request.constraints) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("invalid request: {err}");
            std::process::exit(1);
        }
    };

    println!(
        "success: {} | total time: {:.3} s | {} iterations | {:.1} ms",
        result.success, result.total_time, result.iterations, result.solve_time_ms
    );

    let now = chrono::Local::now();
    let filename = format!("trajectory_{}.json", now.format("%Y-%m-%d_%H-%M-%S"));
    let mut file = std::fs::File::create(&filename).unwrap();
    file.write_all(serde_json::to_string_pretty(&result).unwrap().as_bytes())
        .unwrap();
    println!("Wrote trajectory to \"{filename}\"");
}
