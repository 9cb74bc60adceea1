//! Accessory database, characteristic reads and the change event stream

use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::Filter;

use super::with_bridge;
use crate::accessory::{AccessoryDescription, CharacteristicEvent, Permission, Value};
use crate::bridge::Bridge;

/// HAP status: resource does not exist
pub const STATUS_RESOURCE_DOES_NOT_EXIST: i32 = -70409;

/// HAP status: characteristic cannot be read
pub const STATUS_WRITE_ONLY: i32 = -70405;

#[derive(Debug, Serialize)]
struct AccessoriesResponse {
    accessories: Vec<AccessoryDescription>,
}

#[derive(Debug, Deserialize)]
struct CharacteristicsQuery {
    id: String,
}

#[derive(Debug, Serialize)]
struct CharacteristicsResponse {
    characteristics: Vec<CharacteristicRead>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CharacteristicRead {
    pub aid: u64,
    pub iid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

#[derive(Debug, Serialize)]
struct ChangeEvent<'a> {
    aid: u64,
    iid: u64,
    accessory: &'a str,
    characteristic: &'static str,
    value: &'a Value,
}

#[derive(Debug, Serialize)]
struct QueryError {
    error: String,
}

pub fn routes(
    bridge: Arc<Bridge>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let accessories = warp::path("accessories")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge.clone()))
        .map(|bridge: Arc<Bridge>| {
            let response = AccessoriesResponse {
                accessories: bridge.accessories().map(|a| a.describe()).collect(),
            };
            warp::reply::json(&response)
        });

    let characteristics = warp::path("characteristics")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<CharacteristicsQuery>())
        .and(with_bridge(bridge.clone()))
        .map(|query: CharacteristicsQuery, bridge: Arc<Bridge>| {
            match parse_ids(&query.id) {
                Ok(ids) => {
                    let reads = read_characteristics(&bridge, &ids);
                    let status = if reads.iter().any(|read| read.status.is_some()) {
                        StatusCode::MULTI_STATUS
                    } else {
                        StatusCode::OK
                    };
                    warp::reply::with_status(
                        warp::reply::json(&CharacteristicsResponse {
                            characteristics: reads,
                        }),
                        status,
                    )
                }
                Err(error) => warp::reply::with_status(
                    warp::reply::json(&QueryError { error }),
                    StatusCode::BAD_REQUEST,
                ),
            }
        });

    let events = warp::path("events")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge))
        .map(|bridge: Arc<Bridge>| {
            debug!("event stream subscriber connected");
            let receiver = bridge.notifier().subscribe();
            let stream = BroadcastStream::new(receiver).filter_map(move |item| {
                let event = match item {
                    Ok(event) => event,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "event stream subscriber lagged");
                        return None;
                    }
                };
                sse_event(&bridge, &event).map(Ok::<_, Infallible>)
            });
            warp::sse::reply(warp::sse::keep_alive().stream(stream))
        });

    accessories.or(characteristics).or(events)
}

fn sse_event(bridge: &Bridge, event: &CharacteristicEvent) -> Option<warp::sse::Event> {
    let accessory = bridge
        .accessory(event.aid)
        .map(|a| a.info().name.as_str())
        .unwrap_or_default();
    let payload = ChangeEvent {
        aid: event.aid,
        iid: event.iid,
        accessory,
        characteristic: event.characteristic,
        value: &event.value,
    };
    match warp::sse::Event::default()
        .event("characteristic")
        .json_data(&payload)
    {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!(error = %e, "failed to encode change event");
            None
        }
    }
}

/// Parse `aid.iid[,aid.iid...]`
pub fn parse_ids(query: &str) -> Result<Vec<(u64, u64)>, String> {
    query
        .split(',')
        .map(|pair| {
            let (aid, iid) = pair
                .trim()
                .split_once('.')
                .ok_or_else(|| format!("malformed characteristic id '{pair}'"))?;
            match (aid.parse(), iid.parse()) {
                (Ok(aid), Ok(iid)) => Ok((aid, iid)),
                _ => Err(format!("malformed characteristic id '{pair}'")),
            }
        })
        .collect()
}

pub fn read_characteristics(bridge: &Bridge, ids: &[(u64, u64)]) -> Vec<CharacteristicRead> {
    ids.iter()
        .map(|&(aid, iid)| match bridge.find_characteristic(aid, iid) {
            Some(characteristic)
                if characteristic.kind().permissions().contains(&Permission::Read) =>
            {
                CharacteristicRead {
                    aid,
                    iid,
                    value: Some(characteristic.value()),
                    status: None,
                }
            }
            Some(_) => CharacteristicRead {
                aid,
                iid,
                value: None,
                status: Some(STATUS_WRITE_ONLY),
            },
            None => CharacteristicRead {
                aid,
                iid,
                value: None,
                status: Some(STATUS_RESOURCE_DOES_NOT_EXIST),
            },
        })
        .collect()
}
