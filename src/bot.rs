use anyhow::Result;
use teloxide::utils::markdown;
use tracing::{info, warn};

use crate::config::Config;
use crate::platform::{Command, InboundEvent, Keyboard, Reply, ReplySink};
use crate::transit::{ArrivalResult, StopCandidate, TransitClient, TransitError};

const START_TEXT: &str = "Hola! Soy tus ojos en sistema de TranSantiago. Te ayudo ver donde esta \
     el bus que estas esperando. Simplemente comparte tu ubicación para buscar paraderos mas \
     cercanos, o si ya estas en el paradero, mándame el código indicado en la esquina inferior \
     derecha del letrero.";

const HELP_TEXT: &str = "Simplemente comparte tu ubicación para buscar paraderos mas cercanos, \
     o si ya estas en el paradero, mándame el código indicado en la esquina inferior derecha \
     del letrero.";

const LOCATION_BUTTON: &str = "Buscar paraderos cercanos";

const ARRIVALS_WAIT: &str = "Solicitando información, espera...";
const ARRIVALS_ERROR: &str =
    "Parece que hubo un error al obtener los datos. Intenta de nuevo mas tarde.";
pub const INVALID_STOP_CODE: &str = "Esto no se parece a un código de paradero correcto😐";
pub const OUT_OF_SCHEDULE: &str = "fuera de horario";

const NEARBY_WAIT: &str = "Recibido.\nBuscando paraderos, espera...";
const NEARBY_ERROR: &str =
    "Parece que hubo un error al obtener los datos. Intenta de nuevo más tarde.";
const CHOOSE_STOP: &str = "Elija tu paradero";
pub const NO_STOPS_NEARBY: &str = "¿Oye, donde andai?\nNo encuentro paraderos en tu alrededor🤔";

/// Process-wide state, built once at startup and never mutated.
pub struct AppState {
    pub config: Config,
    transit: TransitClient,
    location_keyboard: Keyboard,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let transit = TransitClient::new(&config.transit)?;
        Ok(Self {
            config,
            transit,
            location_keyboard: Keyboard::RequestLocation(LOCATION_BUTTON.to_string()),
        })
    }

    fn location_keyboard(&self) -> Keyboard {
        self.location_keyboard.clone()
    }
}

/// Dispatch one inbound event to its handler.
///
/// Upstream failures are turned into replies here; only delivery errors
/// from `sink` are returned.
pub async fn route<S>(state: &AppState, event: InboundEvent, sink: &S) -> Result<()>
where
    S: ReplySink + ?Sized,
{
    match event {
        InboundEvent::Command(Command::Start) => start(state, sink).await,
        InboundEvent::Command(Command::Help) => help(state, sink).await,
        InboundEvent::Text(text) => next_arrivals(state, &text, sink).await,
        InboundEvent::Location {
            latitude,
            longitude,
        } => nearby_stops(state, latitude, longitude, sink).await,
    }
}

async fn start<S: ReplySink + ?Sized>(state: &AppState, sink: &S) -> Result<()> {
    sink.send(Reply::plain(START_TEXT).with_keyboard(state.location_keyboard()))
        .await
}

async fn help<S: ReplySink + ?Sized>(state: &AppState, sink: &S) -> Result<()> {
    sink.send(Reply::plain(HELP_TEXT).with_keyboard(state.location_keyboard()))
        .await
}

async fn next_arrivals<S: ReplySink + ?Sized>(state: &AppState, text: &str, sink: &S) -> Result<()> {
    sink.send(Reply::plain(ARRIVALS_WAIT).with_keyboard(Keyboard::Remove))
        .await?;

    let stop_code = stop_code(text);
    if stop_code.is_empty() {
        return sink
            .send(Reply::plain(INVALID_STOP_CODE).with_keyboard(state.location_keyboard()))
            .await;
    }

    info!("Looking up arrivals for stop {}", stop_code);
    let reply = match state.transit.next_arrivals(&stop_code).await {
        Ok(arrivals) if arrivals.is_empty() => Reply::plain(INVALID_STOP_CODE),
        Ok(arrivals) => Reply::markdown(format_arrivals(&arrivals)),
        Err(e) => {
            warn!("Arrivals lookup for {} failed: {}", stop_code, e);
            Reply::plain(arrivals_error(&e))
        }
    };

    sink.send(reply.with_keyboard(state.location_keyboard()))
        .await
}

async fn nearby_stops<S: ReplySink + ?Sized>(
    state: &AppState,
    latitude: f64,
    longitude: f64,
    sink: &S,
) -> Result<()> {
    sink.send(Reply::plain(NEARBY_WAIT)).await?;

    let reply = match state.transit.stops_near(latitude, longitude).await {
        Ok(stops) if stops.is_empty() => {
            Reply::plain(NO_STOPS_NEARBY).with_keyboard(state.location_keyboard())
        }
        Ok(stops) => Reply::plain(CHOOSE_STOP).with_keyboard(stop_choices(&stops)),
        Err(e) => {
            warn!(
                "Nearby stops lookup at ({}, {}) failed: {}",
                latitude, longitude, e
            );
            Reply::plain(NEARBY_ERROR)
        }
    };

    sink.send(reply).await
}

/// Stop codes are printed with spaces on some signs; the API wants them without.
fn stop_code(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn arrivals_error(error: &TransitError) -> String {
    format!("{ARRIVALS_ERROR}\n{error}")
}

/// Arrivals list in Telegram MarkdownV2.
fn format_arrivals(arrivals: &[ArrivalResult]) -> String {
    let mut message = String::from("*№ Micro* \\- _Distancia \\(m\\)_\n");
    for arrival in arrivals {
        let route = markdown::bold(&markdown::escape(&arrival.route_id));
        match arrival.bus_distance {
            Some(distance) => {
                let distance = markdown::italic(&markdown::escape(&distance.to_string()));
                message.push_str(&format!("№ {route} a {distance} metros\n"));
            }
            None => message.push_str(&format!("№ {route} {OUT_OF_SCHEDULE}\n")),
        }
    }
    message
}

fn stop_choices(stops: &[StopCandidate]) -> Keyboard {
    Keyboard::Choices(stops.iter().map(|s| s.stop_id.clone()).collect())
}
