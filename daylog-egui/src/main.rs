use chrono::Timelike;
use clap::Parser;
use daylog_lib::device::{DeviceOpener, SimulatedOpener};
use daylog_lib::display::{AxisRange, AxisRanges, ChannelChart, ChartEvent, DisplayPoint};
use daylog_lib::ljm::LjmOpener;
use daylog_lib::{AcquisitionConfig, AcquisitionScheduler, NoaaCalculator};
use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// Frames queued between the scheduler and the UI before new ones are dropped
const CHART_BUFFER: usize = 64;

/// Live chart for the daylight logger.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Where session databases and exports are written.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
    /// Use the simulated device instead of the LJM driver.
    #[arg(long)]
    simulate: bool,
}

struct DaylogApp {
    chart_receiver: mpsc::Receiver<ChartEvent>,
    points: Vec<DisplayPoint>,
    ranges: AxisRanges,
    status: String,
    running: bool,
}

impl DaylogApp {
    fn new(chart_receiver: mpsc::Receiver<ChartEvent>) -> Self {
        Self {
            chart_receiver,
            points: Vec::new(),
            ranges: AxisRanges::default(),
            status: "Waiting for daylight...".to_string(),
            running: true,
        }
    }

    fn update_data(&mut self) {
        loop {
            match self.chart_receiver.try_recv() {
                Ok(ChartEvent::SessionStarted(session)) => {
                    self.points.clear();
                    self.status = format!("Collecting - {session}");
                }
                Ok(ChartEvent::Frame { points, ranges }) => {
                    self.points = points;
                    self.ranges = ranges;
                }
                Ok(ChartEvent::SessionEnded) => {
                    self.status = "Paused until the next sunrise".to_string();
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.running {
                        self.running = false;
                        self.status = "Scheduler stopped".to_string();
                    }
                    break;
                }
            }
        }
    }

    fn plot(
        &self,
        ui: &mut egui::Ui,
        id: &str,
        label: &str,
        range: AxisRange,
        color: egui::Color32,
        value: fn(&DisplayPoint) -> f64,
    ) {
        ui.label(label);
        let mut plot = Plot::new(id)
            .legend(egui_plot::Legend::default())
            .show_axes([true, true])
            .show_grid(true)
            .allow_drag(false)
            .allow_scroll(false)
            .height(220.0)
            .x_axis_label("Time of day (h)")
            .y_axis_label(label)
            .include_y(range.min);
        if let Some(max) = range.max {
            plot = plot.include_y(max);
        }

        plot.show(ui, |plot_ui| {
            if !self.points.is_empty() {
                let points: PlotPoints = self.points.iter().map(|p| [hours_of_day(p), value(p)]).collect();
                plot_ui.line(Line::new(label, points).color(color).width(2.0));
            }
        });
    }
}

fn hours_of_day(point: &DisplayPoint) -> f64 {
    point.timestamp.num_seconds_from_midnight() as f64 / 3600.0
}

impl eframe::App for DaylogApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_data();
        ctx.request_repaint_after(Duration::from_millis(200));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Daylight Logger");

            ui.horizontal(|ui| {
                ui.label("Status:");
                ui.colored_label(
                    if self.status.starts_with("Collecting") {
                        egui::Color32::GREEN
                    } else if self.running {
                        egui::Color32::YELLOW
                    } else {
                        egui::Color32::RED
                    },
                    &self.status,
                );
            });
            if let Some(latest) = self.points.last() {
                ui.label(format!(
                    "{}: {:.3} A, {:.3} V",
                    latest.timestamp.format("%H:%M:%S"),
                    latest.current,
                    latest.voltage
                ));
            }

            ui.separator();
            self.plot(
                ui,
                "current_plot",
                "Current (A)",
                self.ranges.current,
                egui::Color32::BLUE,
                |p| p.current,
            );
            ui.add_space(10.0);
            self.plot(
                ui,
                "voltage_plot",
                "Voltage (V)",
                self.ranges.voltage,
                egui::Color32::GREEN,
                |p| p.voltage,
            );

            ui.separator();
            ui.label(format!("Points shown: {}", self.points.len()));
        });
    }
}

async fn acquisition_task(scheduler: AcquisitionScheduler) {
    let mut scheduler = scheduler;
    info!("Starting acquisition task");
    if let Err(e) = scheduler.run().await {
        error!("Acquisition stopped: {}", e);
    }
    info!("Acquisition task terminated");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();
    info!("Starting daylight logger GUI");

    let opener: Box<dyn DeviceOpener> = if cli.simulate {
        Box::new(SimulatedOpener::default())
    } else {
        Box::new(LjmOpener::new())
    };
    let config = AcquisitionConfig::standard()?.with_output_dir(cli.output_dir);

    let (chart, rx) = ChannelChart::channel(CHART_BUFFER);
    let cancel = CancellationToken::new();
    let scheduler = AcquisitionScheduler::new(config, opener, Box::new(NoaaCalculator::local()))?
        .with_chart(Box::new(chart))
        .with_cancellation(cancel.clone());
    let task = tokio::spawn(acquisition_task(scheduler));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 620.0])
            .with_title("Daylight Logger"),
        ..Default::default()
    };

    let app = DaylogApp::new(rx);
    info!("Starting egui application");
    let result = eframe::run_native("Daylight Logger", options, Box::new(|_cc| Ok(Box::new(app))));

    // Window closed: finish the running session so its export gets written
    cancel.cancel();
    if let Err(e) = task.await {
        error!("Acquisition task panicked: {}", e);
    }
    result.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}
