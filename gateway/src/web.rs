use std::sync::{Arc, Mutex};

use actix_web::{
    get,
    http::header,
    post,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::settings::{SettingsStore, MODE_SOFTAP, MODE_STATION};

type SharedStore = Arc<Mutex<SettingsStore>>;

fn redirect_home() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .finish()
}

#[get("/")]
async fn index(store: web::Data<SharedStore>) -> impl Responder {
    if let Ok(store) = store.lock() {
        let wifi = store.wifi();
        let mqtt = store.mqtt();
        return HttpResponse::Ok().body(format!(
            "iotnet gateway v{}\nwifi mode: {}\nssid: {}\nmqtt: {}:{}\n",
            env!("CARGO_PKG_VERSION"),
            wifi.mode,
            wifi.ssid,
            mqtt.server,
            mqtt.port,
        ));
    }
    HttpResponse::InternalServerError().finish()
}

#[derive(serde::Deserialize, Debug)]
struct SaveWifiParams {
    wifimode: Option<String>,
    ssid: Option<String>,
    pass: Option<String>,
}

// Takes effect after restart.
#[get("/save-wifi")]
async fn save_wifi(
    query: web::Query<SaveWifiParams>,
    store: web::Data<SharedStore>,
) -> impl Responder {
    let mode = match query.wifimode.as_deref() {
        Some(MODE_STATION) => MODE_STATION,
        Some(MODE_SOFTAP) => MODE_SOFTAP,
        Some(other) => {
            warn!("invalid wifimode: {other}");
            return HttpResponse::BadRequest().body("invalid wifimode");
        }
        None => {
            warn!("missing wifimode");
            return HttpResponse::BadRequest().body("missing wifimode");
        }
    };
    let Some(ssid) = query.ssid.as_deref() else {
        return HttpResponse::BadRequest().body("invalid ssid");
    };
    let Some(pass) = query.pass.as_deref() else {
        return HttpResponse::BadRequest().body("invalid pass");
    };

    if let Ok(mut store) = store.lock() {
        if let Err(e) = store.save_wifi(mode, ssid, pass) {
            error!("cannot persist wifi settings: {e:#}");
            return HttpResponse::InternalServerError().finish();
        }
    }
    redirect_home()
}

#[derive(serde::Deserialize, Debug)]
struct SaveMqttParams {
    #[serde(rename = "mqtt-server")]
    server: Option<String>,
    #[serde(rename = "mqtt-port")]
    port: Option<String>,
}

#[get("/save-mqtt")]
async fn save_mqtt(
    query: web::Query<SaveMqttParams>,
    store: web::Data<SharedStore>,
) -> impl Responder {
    let Some(server) = query.server.as_deref() else {
        return HttpResponse::BadRequest().body("invalid mqtt-server");
    };
    let Some(port) = query.port.as_deref() else {
        return HttpResponse::BadRequest().body("invalid mqtt-port");
    };

    if let Ok(mut store) = store.lock() {
        if let Err(e) = store.save_mqtt_server(server) {
            error!("cannot persist mqtt settings: {e:#}");
            return HttpResponse::InternalServerError().finish();
        }
        // a port that does not parse is ignored, the server is still saved
        if let Ok(port) = port.parse::<u16>() {
            if port != 0 {
                if let Err(e) = store.save_mqtt_port(port) {
                    error!("cannot persist mqtt port: {e:#}");
                    return HttpResponse::InternalServerError().finish();
                }
            }
        }
    }
    redirect_home()
}

#[post("/reset")]
async fn reset(restart: web::Data<mpsc::Sender<()>>) -> impl Responder {
    info!("reset requested");
    let _ = restart.send(()).await;
    redirect_home()
}

pub async fn new_http_server(
    store: SharedStore,
    restart: mpsc::Sender<()>,
    addr: String,
) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(store.clone()))
            .app_data(Data::new(restart.clone()))
            .service(index)
            .service(save_wifi)
            .service(save_mqtt)
            .service(reset)
    })
    .bind(addr)?
    .run()
    .await
}
