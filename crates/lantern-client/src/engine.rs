use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use notify::RecommendedWatcher;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowId};

use lantern_core::schedule::{Resources, Schedule, ScheduleError, Stage, Time};
use lantern_core::transform::update_transforms;

use crate::frame::{FrameError, FrameStatus};
use crate::gpu::{GpuError, GpuState};
use crate::input::{orbit_camera_system, InputState};
use crate::project_config::LaunchSettings;
use crate::renderer::{Renderer, RendererError};
use crate::watcher::{drain_events, start_watching, WatchEvent};
use crate::world::SceneWorld;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Renderer(#[from] RendererError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("surface out of memory")]
    SurfaceLost,
}

/// Main engine struct implementing winit's ApplicationHandler.
///
/// The world is driven by a [`Schedule`]: orbit control in `Update`,
/// transforms then uniform upload in `Prepare`, pass encoding in `Render`.
/// [`InputState`] and the [`Renderer`] are schedule resources.
pub struct Engine {
    settings: LaunchSettings,
    scene: SceneWorld,
    schedule: Schedule,
    resources: Resources,
    _watcher: Option<RecommendedWatcher>,
    watch_rx: Option<mpsc::Receiver<WatchEvent>>,
    last_frame_time: Option<instant::Instant>,
    failure: Option<EngineError>,
}

impl Engine {
    pub fn new(settings: LaunchSettings) -> Result<Self, EngineError> {
        let mut resources = Resources::new();
        resources.insert(InputState::new());
        resources.insert(Time::default());
        Ok(Self {
            settings,
            scene: SceneWorld::new(),
            schedule: build_schedule()?,
            resources,
            _watcher: None,
            watch_rx: None,
            last_frame_time: None,
            failure: None,
        })
    }

    /// The error that stopped the event loop, if any.
    pub fn take_failure(&mut self) -> Option<EngineError> {
        self.failure.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: EngineError) {
        tracing::error!("{}", error);
        self.failure = Some(error);
        event_loop.exit();
    }

    fn renderer(&mut self) -> Option<&mut Renderer> {
        self.resources.get_mut::<Renderer>()
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), EngineError> {
        let window_config = &self.settings.window;
        let window_attrs = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(
                window_config.width,
                window_config.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = pollster::block_on(GpuState::new(Arc::clone(&window), window_config.vsync))?;
        tracing::info!("GPU initialized successfully");

        let mut renderer = Renderer::new(gpu, &self.settings.project_root)?;
        renderer.load_graph(&self.settings.graph)?;
        renderer.load_scene(&mut self.scene, &self.settings.scene)?;
        self.resources.insert(renderer);

        self.start_watcher();
        Ok(())
    }

    /// Start the file watcher on the project directory.
    fn start_watcher(&mut self) {
        match start_watching(&self.settings.project_root) {
            Ok((watcher, rx)) => {
                self._watcher = Some(watcher);
                self.watch_rx = Some(rx);
                tracing::info!("File watching enabled");
            }
            Err(e) => {
                tracing::warn!("Failed to start file watcher: {:?}", e);
            }
        }
    }

    fn reload_graph(&mut self) {
        let path = self.settings.graph.clone();
        tracing::info!("Reloading render graph: {:?}", path);
        if let Some(renderer) = self.renderer() {
            if let Err(e) = renderer.load_graph(&path) {
                tracing::error!("Graph reload failed, keeping previous graph: {}", e);
            }
        }
    }

    fn reload_scene(&mut self) {
        let path = self.settings.scene.clone();
        tracing::info!("Reloading scene: {:?}", path);
        let Some(renderer) = self.resources.get_mut::<Renderer>() else {
            return;
        };
        if let Err(e) = renderer.load_scene(&mut self.scene, &path) {
            tracing::error!("Scene reload failed: {}", e);
        }
    }

    /// Poll for file change events (non-blocking).
    fn poll_changes(&mut self) {
        let events = match &self.watch_rx {
            Some(rx) => drain_events(rx),
            None => return,
        };

        let mut yaml = Vec::new();
        for event in events {
            match event {
                WatchEvent::ShaderChanged(path) => {
                    tracing::info!("Hot-reloading shader: {:?}", path);
                    if let Some(renderer) = self.renderer() {
                        renderer.reload_shader_file(&path);
                    }
                }
                WatchEvent::YamlChanged(path) => yaml.push(path),
            }
        }

        let (graph_changed, scene_changed) = yaml_reloads(&yaml, &self.settings);

        if graph_changed {
            self.reload_graph();
        }
        if scene_changed {
            self.reload_scene();
        }
    }

    /// Engine-level keys. Returns false when the app should exit.
    fn handle_keys(&mut self) -> bool {
        let Some(input) = self.resources.get::<InputState>() else {
            return true;
        };
        if input.just_pressed_key(KeyCode::Escape) {
            return false;
        }
        let reload = input.just_pressed_key(KeyCode::F5);
        let toggles = input.digits_just_pressed();

        if reload {
            self.reload_graph();
            self.reload_scene();
        }
        if let Some(renderer) = self.renderer() {
            for index in toggles {
                renderer.toggle_pass(index);
            }
        }
        true
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = instant::Instant::now();
        let dt = self
            .last_frame_time
            .map_or(1.0 / 60.0, |last| now.duration_since(last).as_secs_f32().min(0.1));
        self.last_frame_time = Some(now);

        if !self.handle_keys() {
            tracing::info!("Escape pressed, exiting");
            event_loop.exit();
            return;
        }
        self.poll_changes();

        self.schedule
            .run_frame(&mut self.scene.world, &mut self.resources, dt);

        if let Some(input) = self.resources.get_mut::<InputState>() {
            input.end_frame();
        }
        if self.renderer().is_some_and(|r| r.lost) {
            self.fail(event_loop, EngineError::SurfaceLost);
        }
    }
}

fn build_schedule() -> Result<Schedule, ScheduleError> {
    let mut schedule = Schedule::new();

    schedule.add_system(Stage::Update, "orbit_control", |world, res| {
        if let Some(input) = res.get::<InputState>() {
            orbit_camera_system(world, input);
        }
    })?;

    schedule.add_system(Stage::Prepare, "transforms", |world, _| {
        update_transforms(world);
    })?;

    schedule.add_system(Stage::Prepare, "prepare", |world, res| {
        let time = res.get::<Time>().copied().unwrap_or_default();
        let Some(renderer) = res.get_mut::<Renderer>() else {
            return;
        };
        if let Err(e) = renderer.prepare_frame(world, &time) {
            tracing::error!("Prepare failed: {}", e);
        }
    })?;

    schedule.add_system(Stage::Render, "render", |_, res| {
        let Some(renderer) = res.get_mut::<Renderer>() else {
            return;
        };
        match renderer.render() {
            Ok(FrameStatus::Presented) => {}
            Ok(FrameStatus::Skipped) => tracing::debug!("Frame skipped"),
            Err(FrameError::OutOfMemory) => renderer.lost = true,
            Err(e) => tracing::error!("Frame failed: {}", e),
        }
    })?;

    Ok(schedule)
}

/// Which of (graph, scene) to reload for a batch of changed YAML files. The
/// active graph file reloads the graph; any other YAML file, the scene file
/// and materials included, reloads the scene.
fn yaml_reloads(paths: &[PathBuf], settings: &LaunchSettings) -> (bool, bool) {
    let mut graph = false;
    let mut scene = false;
    for path in paths {
        if same_file(path, &settings.graph) {
            graph = true;
        } else {
            scene = true;
        }
    }
    (graph, scene)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl ApplicationHandler for Engine {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.resources.contains::<Renderer>() {
            return;
        }
        tracing::info!("Application resumed, initializing GPU");
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(input) = self.resources.get_mut::<InputState>() {
            input.handle_window_event(&event);
        }

        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = self.renderer() {
                    renderer.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.resources.get::<Renderer>() {
            renderer.gpu.window.request_redraw();
        }
    }
}
