use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use irc::client::prelude::*;
use irc::proto::CapSubCommand;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use crate::constants::{TTV_IRC_PORT, TTV_IRC_URI};
use crate::economy::Economy;
use crate::util::env::{EnvErr, Var};
use crate::var;

#[derive(Debug)]
pub enum IrcMessage {
    Privmsg { tags: IrcTags },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IrcTags {
    pub user_id: String,
    pub user_login: String,
    pub channel_name: String,
    pub channel_id: String,
}

/// Connects to the configured channel and credits chat activity. Returns the socket task and
/// the reader task.
#[instrument(skip(economy))]
pub async fn irc_runner(economy: Arc<Economy>) -> IrcResult<Vec<JoinHandle<()>>> {
    let channel = var!(Var::TwitchChannel).await?.to_lowercase();
    let (mut irc_client, receiver) = IrcConnection::init(&channel).await?;

    let rx_handle = tokio::spawn(async move {
        read_channel(receiver, economy).await;
    });

    let client_stream_reader = tokio::spawn(async move {
        if let Err(e) = irc_client.run().await {
            tracing::error!(error = ?e, "irc client stopped");
        }
    });

    Ok(vec![client_stream_reader, rx_handle])
}

#[derive(Debug)]
pub struct IrcConnection {
    pub client: Client,
    pub channel: String,
    pub sender: UnboundedSender<IrcMessage>,
    pub id: Uuid,
}

impl IrcConnection {
    #[instrument]
    pub async fn init(channel: &str) -> IrcResult<(Self, UnboundedReceiver<IrcMessage>)> {
        let config = Config {
            use_tls: Some(true),
            nickname: Some(var!(Var::UserLogin).await?.to_string()),
            password: Some(format!("oauth:{}", var!(Var::UserToken).await?)),

            server: Some(TTV_IRC_URI.to_string()),
            port: Some(TTV_IRC_PORT),
            ping_time: Some(300),
            ..Config::default()
        };

        let (msg_tx, msg_rx) = mpsc::unbounded_channel::<IrcMessage>();
        let client = Client::from_config(config).await?;

        Ok((
            Self {
                client,
                channel: format!("#{channel}"),
                sender: msg_tx,
                id: Uuid::new_v4(),
            },
            msg_rx,
        ))
    }

    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn run(&mut self) -> IrcResult<()> {
        self.connect()?;
        let mut stream = self.client.stream()?;

        let mut check_interval = tokio::time::interval(Duration::from_secs(30));
        check_interval.tick().await;

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(msg)) => self.command_parser(&msg)?,
                    Some(Err(e)) => tracing::warn!(error = ?e, "irc stream error"),
                    None => {
                        tracing::warn!("irc stream closed");
                        return Ok(());
                    }
                },

                _ = check_interval.tick() => {
                    if let Err(e) = self.rejoin_channel() {
                        tracing::error!(error = ?e, "channel rejoin failure");
                    }
                }
            }
        }
    }

    fn connect(&mut self) -> IrcResult<()> {
        self.client.identify()?;
        self.client
            .send_cap_req(&[TtvCap::Commands.into(), TtvCap::Tags.into()])?;

        Ok(())
    }

    fn joined(&self) -> bool {
        self.client
            .list_channels()
            .is_some_and(|channels| channels.contains(&self.channel))
    }

    fn rejoin_channel(&mut self) -> IrcResult<()> {
        if !self.joined() {
            tracing::warn!(channel = %self.channel, "trying channel rejoin");
            self.client.send_join(&self.channel)?;
        }

        Ok(())
    }

    #[instrument(skip(self, msg))]
    fn command_parser(&mut self, msg: &Message) -> IrcResult<()> {
        match &msg.command {
            Command::PRIVMSG(channel, content) => {
                let data = IrcMessage::Privmsg {
                    tags: parse_tags(msg, channel),
                };

                tracing::trace!(data = ?data, len = content.len(), "RX PRIVMSG");
                if let Err(err) = self.sender.send(data) {
                    tracing::error!(error = ?err, "failed to send to reader channel");
                }
            }

            Command::CAP(_, result, caps, _) => match result {
                CapSubCommand::ACK => {
                    if let Some(caps) = caps {
                        tracing::info!("CAP REQ {} ok", caps);
                    }
                    if !self.joined() {
                        self.client.send_join(&self.channel)?;
                    }
                }

                CapSubCommand::NAK => tracing::warn!("CAP REQ {:?} invalid", caps),

                _ => tracing::error!("unknown CAP REQ res {:?} (raw msg={:?})", result, msg),
            },

            Command::NOTICE(target, notice) => {
                tracing::warn!("{}: RECV NOTICE: {}", target, notice);
            }

            Command::JOIN(channel, _, _) => {
                if let Some(Prefix::Nickname(user, _, _)) = &msg.prefix {
                    tracing::debug!("{}: JOIN {}", user, channel);
                }
            }

            _ => {
                tracing::trace!(command = ?msg.command, "IRC received generic cmd");
            }
        }

        Ok(())
    }
}

/// Credits chat points for every line read off the socket, until the sender goes away.
#[instrument(skip(rx, economy))]
pub async fn read_channel(mut rx: UnboundedReceiver<IrcMessage>, economy: Arc<Economy>) {
    tracing::debug!("IRC mpsc reader started");
    while let Some(msg) = rx.recv().await {
        match msg {
            IrcMessage::Privmsg { tags } => {
                if tags.user_login.is_empty() {
                    continue;
                }

                match economy.chat_message(&tags.user_login).await {
                    Ok(Some(balances)) => tracing::trace!(
                        login = %tags.user_login,
                        user_id = %tags.user_id,
                        channel = %tags.channel_name,
                        channel_id = %tags.channel_id,
                        ?balances,
                        "chat points credited"
                    ),
                    Ok(None) => (),
                    Err(e) => {
                        tracing::warn!(login = %tags.user_login, error = %e, "chat points not credited")
                    }
                }
            }
        }
    }
}

pub fn parse_tags(msg: &Message, channel: &str) -> IrcTags {
    let mut result = IrcTags {
        channel_name: channel.trim_start_matches('#').to_string(),
        user_login: msg
            .source_nickname()
            .map(str::to_lowercase)
            .unwrap_or_default(),
        ..IrcTags::default()
    };

    for tag in msg.tags.iter().flatten() {
        match (tag.0.as_str(), tag.1.as_deref()) {
            ("room-id", Some(room_id)) => result.channel_id = room_id.to_string(),
            ("user-id", Some(user_id)) => result.user_id = user_id.to_string(),
            ("display-name", Some(name)) if result.user_login.is_empty() => {
                result.user_login = name.to_lowercase()
            }
            _ => (),
        }
    }

    result
}

pub type IrcResult<T> = core::result::Result<T, IrcClientErr>;

#[derive(Debug, Error)]
pub enum IrcClientErr {
    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error(transparent)]
    ClientError(#[from] irc::error::Error),
}

#[derive(Debug)]
pub enum TtvCap {
    Tags,
    Commands,
}

impl From<TtvCap> for Capability {
    fn from(value: TtvCap) -> Self {
        match value {
            TtvCap::Tags => Capability::Custom("twitch.tv/tags"),
            TtvCap::Commands => Capability::Custom("twitch.tv/commands"),
        }
    }
}
