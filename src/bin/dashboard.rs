use std::collections::VecDeque;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use egui::{ComboBox, Key, RichText};
use egui_plot::{Legend, Line, Plot, PlotPoints};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};

use helios_dashboard::{
    Field, LinkEvent, Subscription, TelemetryLink,
    console_log::ConsoleLog,
    recorder::Recorder,
    serial_port_list,
    settings::{Settings, Theme},
    snapshot::{History, Snapshot},
    timers::{MissionClock, MissionEvent},
};

const MAX_CONSOLE_LINES: usize = 1000;
const NO_PORTS: &str = "No ports found";

#[derive(Parser, Debug)]
#[command(name = "dashboard")]
#[command(about = "HELIOS ground-station dashboard", long_about = None)]
struct Args {
    /// Serial port to open on startup
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    #[arg(short, long)]
    fullscreen: bool,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(AsRefStr, EnumIter, Clone, Copy, Debug, PartialEq, Eq)]
enum Tab {
    Flight,
    Console,
    Plots,
}

struct App {
    link: TelemetryLink,
    rx: Subscription,
    settings: Settings,
    snapshot: Snapshot,
    history: History,
    clock: MissionClock,
    console: VecDeque<String>,
    console_log: ConsoleLog,
    recorder: Option<Recorder>,
    ports: Vec<String>,
    port_choice: usize,
    command: String,
    tab: Tab,
    show_info: bool,
}

fn main() -> eframe::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut settings = Settings::load();
    if let Some(baud) = args.baud {
        settings.serial.baud_rate = baud;
    }

    let app = App::new(settings, args.port);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("HELIOS Dashboard")
            .with_fullscreen(args.fullscreen),
        ..Default::default()
    };
    eframe::run_native(
        "HELIOS Dashboard",
        options,
        Box::new(|cc| {
            apply_theme(&cc.egui_ctx, app.settings.ui.theme);
            Ok(Box::new(app))
        }),
    )
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn apply_theme(ctx: &egui::Context, theme: Theme) {
    ctx.set_visuals(match theme {
        Theme::Dark => egui::Visuals::dark(),
        Theme::Light => egui::Visuals::light(),
    });
}

impl App {
    fn new(settings: Settings, port: Option<String>) -> Self {
        let mut link = TelemetryLink::new(settings.serial.clone());
        // Subscribe before connecting so connection errors reach the console.
        let rx = link.subscribe();

        let ports = serial_port_list();
        let port_choice = port
            .as_ref()
            .and_then(|p| ports.iter().position(|known| known == p))
            .unwrap_or(0);

        match port {
            Some(port) => {
                let _ = link.connect(&port);
            }
            None if settings.serial.auto_connect => {
                let _ = link.connect_first_available();
            }
            None => {}
        }

        let recorder = if settings.logging.record_csv {
            Recorder::start(&settings.logging.csv_dir, link.subscribe())
                .inspect_err(|e| log::error!("CSV recording disabled: {e}"))
                .ok()
        } else {
            None
        };

        App {
            link,
            rx,
            history: History::new(settings.ui.history_len),
            settings,
            snapshot: Snapshot::new(),
            clock: MissionClock::new(),
            console: VecDeque::with_capacity(MAX_CONSOLE_LINES),
            console_log: ConsoleLog::new(),
            recorder,
            ports,
            port_choice,
            command: String::new(),
            tab: Tab::Flight,
            show_info: false,
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match &event {
                LinkEvent::Frame(frame) => {
                    self.snapshot.merge(frame);
                    self.history.push(frame);
                }
                LinkEvent::Unmatched(_) => {
                    self.snapshot.note_unmatched();
                    self.append_console(event.describe());
                }
                LinkEvent::Status(_) | LinkEvent::Error(_) | LinkEvent::Raw(_) => {
                    self.append_console(event.describe());
                }
            }
        }
    }

    fn append_console(&mut self, message: String) {
        if let Err(e) = self.console_log.append(&message) {
            log::error!("{e:#}");
        }
        if self.console.len() >= MAX_CONSOLE_LINES {
            self.console.pop_front();
        }
        self.console.push_back(message);
    }

    fn selected_port(&self) -> Option<&String> {
        self.ports.get(self.port_choice)
    }

    fn set_theme(&mut self, ctx: &egui::Context, theme: Theme) {
        if self.settings.ui.theme == theme {
            return;
        }
        self.settings.ui.theme = theme;
        apply_theme(ctx, theme);
        if let Err(e) = self.settings.save() {
            log::error!("Failed to save settings: {e:#}");
        }
    }

    fn handle_hotkeys(&mut self, ctx: &egui::Context) {
        let keys = [(Key::Num1, Tab::Flight), (Key::Num2, Tab::Console), (Key::Num3, Tab::Plots)];
        for (key, tab) in keys {
            if ctx.input(|i| i.modifiers.command && i.key_pressed(key)) {
                self.tab = tab;
            }
        }
    }

    fn flight_tab(&mut self, ui: &mut egui::Ui) {
        let now = Local::now();

        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label(RichText::new("H.E.L.I.O.S. Dashboard").size(28.0));
                ui.label(RichText::new(now.format("%H:%M:%S").to_string()).size(18.0));
                ui.add_space(6.0);

                for event in MissionEvent::all() {
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(self.clock.label(event, now)).size(16.0));
                        if ui.small_button("Start").clicked() {
                            self.clock.start(event, Local::now());
                        }
                        if ui.small_button("Reset").clicked() {
                            self.clock.reset(event);
                        }
                    });
                }
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::TOP), |ui| {
                ui.vertical(|ui| {
                    ui.label("Choose a theme:");
                    let mut theme = self.settings.ui.theme;
                    ui.radio_value(&mut theme, Theme::Light, "Light");
                    ui.radio_value(&mut theme, Theme::Dark, "Dark");
                    self.set_theme(ui.ctx(), theme);
                });
            });
        });

        ui.separator();

        ui.horizontal(|ui| {
            if ui
                .button(if self.show_info { "Hide Info" } else { "Show Info" })
                .clicked()
            {
                self.show_info = !self.show_info;
            }
            if ui.button("Quit").clicked() {
                ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });

        ui.add_space(10.0);

        egui::Grid::new("dashboard_fields")
            .striped(true)
            .min_col_width(160.0)
            .show(ui, |ui| {
                for field in Field::dashboard_fields() {
                    ui.label(RichText::new(field.as_ref()).size(18.0));
                    ui.label(RichText::new(self.snapshot.display_value(field)).size(18.0).monospace());
                    ui.end_row();
                }
            });

        ui.add_space(6.0);
        match self.snapshot.last_update() {
            Some(t) => ui.label(format!(
                "Last update: {} ({} frames, {} unmatched)",
                t.format("%H:%M:%S%.3f"),
                self.snapshot.frame_count(),
                self.snapshot.unmatched_count()
            )),
            None => ui.label("No telemetry received yet"),
        };

        if self.show_info {
            ui.with_layout(egui::Layout::bottom_up(egui::Align::RIGHT), |ui| {
                egui::Frame::group(ui.style()).show(ui, |ui| {
                    ui.label(format!(
                        "Version: {}\nHardware Endpoint Launch Interface Operation System\nHelios Dashboard for Solaris rocket avionics division",
                        env!("CARGO_PKG_VERSION")
                    ));
                });
            });
        }
    }

    fn console_tab(&mut self, ui: &mut egui::Ui) {
        let connected = self.link.is_connected();

        ui.horizontal(|ui| {
            ui.label("Select Serial Port:");
            ui.add_enabled_ui(!connected, |ui| {
                ComboBox::from_id_salt("port_dropdown")
                    .selected_text(self.selected_port().map_or(NO_PORTS, |p| p.as_str()))
                    .show_ui(ui, |ui| {
                        for (idx, port) in self.ports.iter().enumerate() {
                            ui.selectable_value(&mut self.port_choice, idx, port);
                        }
                    });
            });
        });

        ui.horizontal(|ui| {
            if ui.button("Refresh Ports").clicked() {
                self.ports = serial_port_list();
                self.port_choice = 0;
            }

            if ui.add_enabled(!connected, egui::Button::new("Connect")).clicked() {
                match self.selected_port().cloned() {
                    // Failures are reported through the event channel.
                    Some(port) => {
                        let _ = self.link.connect(&port);
                    }
                    None => self.append_console("No serial ports available.".to_string()),
                }
            }

            let has_session = self.link.port_name().is_some();
            if ui.add_enabled(has_session, egui::Button::new("Disconnect")).clicked() {
                self.link.disconnect();
            }

            if let Some(port) = self.link.port_name().filter(|_| connected) {
                ui.label(format!("Connected: {port}"));
            }
        });

        ui.separator();

        let height = (ui.available_height() - 80.0).max(120.0);
        egui::ScrollArea::vertical()
            .id_salt("console_output")
            .max_height(height)
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.console {
                    ui.monospace(line);
                }
            });

        ui.separator();

        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.command)
                    .hint_text("Command")
                    .desired_width(ui.available_width() - 80.0),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
            if ui.button("Send").clicked() || submitted {
                self.send_command();
            }
        });

        ui.horizontal(|ui| {
            if ui.button("Clear Console").clicked() {
                self.console.clear();
                if let Err(e) = self.console_log.reopen() {
                    self.append_console(format!("Error: {e:#}"));
                }
            }

            let logging_label = if self.console_log.is_active() {
                "Stop Logging"
            } else {
                "Start Logging"
            };
            if ui.button(logging_label).clicked() {
                self.toggle_logging();
            }

            let recording_label = if self.recorder.is_some() {
                "Stop CSV"
            } else {
                "Record CSV"
            };
            if ui.button(recording_label).clicked() {
                self.toggle_recording();
            }
        });
    }

    fn send_command(&mut self) {
        let command = self.command.trim().to_string();
        if command.is_empty() {
            return;
        }
        match self.link.write(&command) {
            Ok(()) => self.command.clear(),
            Err(e) => self.append_console(format!("Error sending command: {e}")),
        }
    }

    fn toggle_logging(&mut self) {
        if self.console_log.is_active() {
            self.console_log.stop();
            return;
        }
        let path = self.settings.logging.console_log_path.clone();
        if let Err(e) = self.console_log.start(&path) {
            self.append_console(format!("Error: {e:#}"));
        }
    }

    fn toggle_recording(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            let path = recorder.path().display().to_string();
            match recorder.stop() {
                Ok(()) => self.append_console(format!("Stopped recording to {path}")),
                Err(e) => self.append_console(format!("Error: {e:#}")),
            }
            return;
        }
        match Recorder::start(&self.settings.logging.csv_dir, self.link.subscribe()) {
            Ok(recorder) => {
                self.append_console(format!("Recording to {}", recorder.path().display()));
                self.recorder = Some(recorder);
            }
            Err(e) => self.append_console(format!("Error: {e:#}")),
        }
    }

    fn plots_tab(&mut self, ui: &mut egui::Ui) {
        if ui.button("Clear Plots").clicked() {
            self.history.clear();
        }

        let fields: Vec<Field> = self.history.fields().collect();
        if fields.is_empty() {
            ui.label("No telemetry received yet");
            return;
        }

        let plot_height = (ui.available_height() / fields.len() as f32 - 30.0).max(120.0);
        egui::ScrollArea::vertical()
            .id_salt("plots")
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                for field in fields {
                    let title = match field.unit() {
                        Some(unit) => format!("{field} ({unit})"),
                        None => field.to_string(),
                    };
                    ui.label(RichText::new(&title).strong());

                    let points: PlotPoints = self.history.points(field).into_iter().collect();
                    Plot::new(field.as_ref())
                        .legend(Legend::default())
                        .height(plot_height)
                        .x_axis_label("Time (s)")
                        .show(ui, |plot_ui| {
                            plot_ui.line(Line::new(title.clone(), points));
                        });
                }
            });
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        self.link.release_if_stopped();
        self.handle_hotkeys(ctx);

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                for tab in Tab::iter() {
                    ui.selectable_value(&mut self.tab, tab, tab.as_ref());
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let status = match self.link.port_name() {
                        Some(port) if self.link.is_connected() => format!("● {port}"),
                        _ => "○ Disconnected".to_string(),
                    };
                    ui.label(status);
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Flight => self.flight_tab(ui),
            Tab::Console => self.console_tab(ui),
            Tab::Plots => self.plots_tab(ui),
        });

        // request redraw
        ctx.request_repaint_after(Duration::from_millis(self.settings.ui.poll_interval_ms));
    }
}
