use super::api::{OpsApiClient, Place};
use super::format;
use super::traits::{SharedLocation, Tool, ToolRequest};
use crate::commands::ToolKind;
use crate::store::{HomeAddressRecord, HomeAddressStore};
use crate::wechat::ReplyBody;
use async_trait::async_trait;
use std::sync::Arc;

const DIRECTIONS_HELP: &str = "map is a direction tool.

Usage:

1. 规划交通路线
\tmap direct PlaceA to PlaceB

Example
\tmap direct 杭州火车东站 to 武林广场

2. 设置Home地址
\tmap set home Place

3. 查询Home地址
\tmap get home

4. 规划回家交通路线
\tmap go home Place
\tor
\t直接发送位置信息

This tool is powered by Google Maps.";

const PLACE_LOOKUP_FAILED: &str = "查找地点失败，请尝试其他地点关键词。";
const NO_ROUTE: &str = "查询线路失败，无可用线路。";
const HOME_NOT_SET: &str = "用户还未设置Home地址，使用map set home来设置Home地址。";
const SET_HOME_LOOKUP_FAILED: &str = "设置Home地址失败，请尝试其他地址关键词。";
const SET_HOME_SAVE_FAILED: &str = "设置Home地址失败。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionsCommand {
    Direct { origin: String, destination: String },
    SetHome { address: String },
    GetHome,
    GoHome { origin: String },
}

impl DirectionsCommand {
    /// Positional shapes after the tool token; `None` means show help.
    pub fn parse(args: &str) -> Option<Self> {
        let tokens: Vec<&str> = args.split_whitespace().collect();
        match tokens.as_slice() {
            ["direct", rest @ ..] => {
                let split = rest.iter().position(|token| *token == "to")?;
                let origin = rest[..split].join(" ");
                let destination = rest[split + 1..].join(" ");
                if origin.is_empty() || destination.is_empty() {
                    return None;
                }
                Some(Self::Direct {
                    origin,
                    destination,
                })
            }
            ["set", "home", rest @ ..] if !rest.is_empty() => Some(Self::SetHome {
                address: rest.join(" "),
            }),
            ["get", "home"] => Some(Self::GetHome),
            ["go", "home", rest @ ..] => Some(Self::GoHome {
                origin: rest.join(" "),
            }),
            _ => None,
        }
    }
}

/// `map …`: transit directions and the per-sender home address.
pub struct DirectionsTool {
    client: Arc<OpsApiClient>,
    store: Arc<HomeAddressStore>,
}

impl DirectionsTool {
    pub fn new(client: Arc<OpsApiClient>, store: Arc<HomeAddressStore>) -> Self {
        Self { client, store }
    }

    /// First keyword-search hit that carries a place id, or `None` on error
    /// or no usable result.
    async fn find_place(&self, keyword: &str) -> Option<Place> {
        match self.client.place_search(keyword).await {
            Ok(search) => {
                let place = first_routable(search.results);
                if place.is_none() {
                    tracing::info!("no place found for '{keyword}'");
                }
                place
            }
            Err(_) => None,
        }
    }

    async fn find_place_nearby(&self, keyword: &str, latlng: &str) -> Option<Place> {
        match self.client.place_nearby(keyword, latlng).await {
            Ok(search) => first_routable(search.results),
            Err(_) => None,
        }
    }

    async fn route(&self, origin_id: &str, destination_id: &str) -> String {
        match self
            .client
            .transit_directions(origin_id, destination_id)
            .await
        {
            Ok(directions) => format::directions(&directions).unwrap_or_else(|| NO_ROUTE.to_string()),
            Err(err) => format!("查询线路失败，错误信息：{err}"),
        }
    }

    async fn direct(&self, origin: &str, destination: &str) -> String {
        let Some(from) = self.find_place(origin).await else {
            return PLACE_LOOKUP_FAILED.to_string();
        };
        let Some(to) = self.find_place(destination).await else {
            return PLACE_LOOKUP_FAILED.to_string();
        };
        self.route(&from.place_id, &to.place_id).await
    }

    async fn set_home(&self, sender: &str, address: &str) -> String {
        let Some(place) = self.find_place(address).await else {
            return SET_HOME_LOOKUP_FAILED.to_string();
        };
        let record = HomeAddressRecord {
            place_id: place.place_id,
            address: place.formatted_address,
        };
        let formatted = record.address.clone();
        let store = Arc::clone(&self.store);
        let owner = sender.to_string();
        let saved = tokio::task::spawn_blocking(move || store.set(&owner, record)).await;
        match saved {
            Ok(Ok(previous)) => {
                if previous.is_some() {
                    tracing::info!("overwriting home address for {sender}");
                }
                tracing::info!("home address for {sender} set to {formatted}");
                format!("设置Home地址成功：{formatted}")
            }
            Ok(Err(err)) => {
                tracing::warn!("failed to persist home address for {sender}: {err}");
                SET_HOME_SAVE_FAILED.to_string()
            }
            Err(err) => {
                tracing::error!("home store task for {sender} failed: {err}");
                SET_HOME_SAVE_FAILED.to_string()
            }
        }
    }

    fn get_home(&self, sender: &str) -> String {
        match self.home_of(sender) {
            Some(home) => format!("Home地址：{}", home.address),
            None => HOME_NOT_SET.to_string(),
        }
    }

    /// Routes home from a typed origin, or from a shared location when one is
    /// present. A location is resolved nearby first and by keyword second.
    async fn go_home(&self, sender: &str, origin: &str, location: Option<&SharedLocation>) -> String {
        let Some(home) = self.home_of(sender) else {
            return HOME_NOT_SET.to_string();
        };

        let from = match location {
            Some(location) => {
                let nearby = self.find_place_nearby(origin, &location.latlng()).await;
                match nearby {
                    Some(place) => Some(place),
                    None if origin.is_empty() => None,
                    None => self.find_place(origin).await,
                }
            }
            None => self.find_place(origin).await,
        };
        let Some(from) = from else {
            return PLACE_LOOKUP_FAILED.to_string();
        };
        self.route(&from.place_id, &home.place_id).await
    }

    fn home_of(&self, sender: &str) -> Option<HomeAddressRecord> {
        self.store
            .get(sender)
            .filter(|home| !home.place_id.is_empty() && !home.address.is_empty())
    }
}

/// Routing needs a place id; results without one are skipped.
fn first_routable(results: Vec<Place>) -> Option<Place> {
    results
        .into_iter()
        .find(|place| !place.place_id.trim().is_empty())
}

#[async_trait]
impl Tool for DirectionsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Directions
    }

    fn help(&self) -> &str {
        DIRECTIONS_HELP
    }

    async fn execute(&self, request: &ToolRequest) -> ReplyBody {
        let sender = request.sender.as_str();
        if let Some(location) = &request.location {
            let text = self.go_home(sender, &location.label, Some(location)).await;
            return ReplyBody::Text(text);
        }

        let text = match DirectionsCommand::parse(&request.args) {
            Some(DirectionsCommand::Direct {
                origin,
                destination,
            }) => self.direct(&origin, &destination).await,
            Some(DirectionsCommand::SetHome { address }) => self.set_home(sender, &address).await,
            Some(DirectionsCommand::GetHome) => self.get_home(sender),
            Some(DirectionsCommand::GoHome { origin }) if !origin.is_empty() => {
                self.go_home(sender, &origin, None).await
            }
            Some(DirectionsCommand::GoHome { .. }) | None => DIRECTIONS_HELP.to_string(),
        };
        ReplyBody::Text(text)
    }
}
