//! The runtime: owns the terminal, the background workers and the state, and
//! feeds events through [`update`] one at a time.

use std::sync::Arc;

use color_eyre::Result;
use ratatui::layout::Rect;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::commands::Dispatcher;
use crate::config::{AppConfig, KeyResolver};
use crate::message::{AppEvent, Effect};
use crate::provider::FunctionProvider;
use crate::state::{AppState, LayoutState, Settings};
use crate::stream::StreamSessions;
use crate::theme::{self, Theme};
use crate::tui::{Event, Tui};
use crate::ui::{self, Chrome, SessionInfo, Spinner};
use crate::update;

const FRAME_RATE: f64 = 30.0;
const TICK_RATE: f64 = 4.0;

pub struct App {
    state: AppState,
    keys: KeyResolver,
    theme: Theme,
    session: SessionInfo,
    dispatcher: Dispatcher,
    streams: StreamSessions,
    spinner: Spinner,
    events_rx: Option<UnboundedReceiver<AppEvent>>,
    should_quit: bool,
    should_suspend: bool,
}

impl App {
    pub fn new(
        provider: Arc<dyn FunctionProvider>,
        config: &AppConfig,
        settings: Settings,
        session: SessionInfo,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: AppState::new(settings, 0, 0),
            keys: KeyResolver::new(Arc::new(config.keybindings.clone())),
            theme: theme::theme_from_name(&config.theme.name),
            session,
            dispatcher: Dispatcher::new(provider.clone(), events_tx.clone()),
            streams: StreamSessions::new(provider, config.streaming.clone(), events_tx),
            spinner: Spinner::default(),
            events_rx: Some(events_rx),
            should_quit: false,
            should_suspend: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let Some(mut events_rx) = self.events_rx.take() else {
            return Ok(());
        };
        let mut tui = Tui::new(FRAME_RATE, TICK_RATE)?;
        tui.enter()?;

        let size = tui.size()?;
        self.state.layout = LayoutState::compute(size.width, size.height);
        let effects = update::init(&mut self.state);
        self.apply(effects);

        loop {
            tokio::select! {
                event = tui.next_event() => match event {
                    Some(event) => self.handle_tui_event(event, &mut tui)?,
                    None => break,
                },
                Some(event) = events_rx.recv() => self.dispatch(event),
            }

            if self.should_suspend {
                tracing::info!("Suspending");
                tui.suspend()?;
                tui.resume()?;
                self.should_suspend = false;
            } else if self.should_quit {
                break;
            }
        }

        tracing::info!(running = self.dispatcher.running(), "Shutting down");
        self.streams.stop_all();
        self.dispatcher.shutdown();
        tui.exit()?;
        Ok(())
    }

    fn handle_tui_event(&mut self, event: Event, tui: &mut Tui) -> Result<()> {
        match event {
            Event::Init => {}
            Event::Quit => self.dispatch(AppEvent::Quit),
            Event::Suspend => self.should_suspend = true,
            Event::Error(err) => tracing::warn!(error = %err, "Terminal event error"),
            Event::Tick => {
                self.spinner.tick();
                self.dispatch(AppEvent::Tick);
            }
            Event::Render => self.render(tui)?,
            Event::Key(key) => self.dispatch(AppEvent::Key(key)),
            Event::Resize(width, height) => {
                tui.resize(Rect::new(0, 0, width, height))?;
                self.dispatch(AppEvent::Resize(width, height));
                self.render(tui)?;
            }
        }
        Ok(())
    }

    /// Run one event through the state machine and carry out its effects.
    fn dispatch(&mut self, event: AppEvent) {
        if let AppEvent::Task(completion) = &event {
            self.dispatcher.finished(completion.id);
        }
        let effects = update::update(&mut self.state, event, &self.keys);
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Spawn(request) => self.dispatcher.spawn(request),
                Effect::Abort(id) => self.dispatcher.abort(id),
                Effect::StartStream { session, function } => {
                    tracing::info!(session = session.0, %function, "Starting log stream");
                    self.streams.start(session, function);
                }
                Effect::StopStream(session) => self.streams.stop(session),
                Effect::Quit => self.should_quit = true,
            }
        }
    }

    fn render(&mut self, tui: &mut Tui) -> Result<()> {
        let chrome = Chrome {
            theme: &self.theme,
            keys: &self.keys,
            session: &self.session,
        };
        let state = &self.state;
        let spinner = &mut self.spinner;
        tui.draw(|frame| ui::render(frame, state, &chrome, spinner))?;
        Ok(())
    }
}
