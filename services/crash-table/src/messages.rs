//! Websocket wire messages. Every frame is a JSON object tagged by `type`.

use crashline_execution::MinesCashout;
use crashline_types::{
    BetError, CashoutReceipt, LedgerMode, MinesView, Multiplier, ParticipantView, RevealOutcome,
    RoundSnapshot, SettlementStatus,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    Join {
        request_id: String,
        player_id: String,
        display_name: Option<String>,
    },
    Bet {
        request_id: String,
        player_id: String,
        amount: u64,
        #[serde(default)]
        mode: Option<LedgerMode>,
        auto_cashout: Option<Multiplier>,
    },
    Cashout {
        request_id: String,
        player_id: String,
    },
    Balance {
        request_id: String,
        player_id: String,
    },
    MinesStart {
        request_id: String,
        player_id: String,
        amount: u64,
        #[serde(default)]
        mode: Option<LedgerMode>,
        mines: u8,
    },
    MinesReveal {
        request_id: String,
        player_id: String,
        cell: u8,
    },
    MinesView {
        request_id: String,
        player_id: String,
    },
    MinesCashout {
        request_id: String,
        player_id: String,
    },
}

impl InboundMessage {
    pub fn request_id(&self) -> &str {
        match self {
            InboundMessage::Join { request_id, .. }
            | InboundMessage::Bet { request_id, .. }
            | InboundMessage::Cashout { request_id, .. }
            | InboundMessage::Balance { request_id, .. }
            | InboundMessage::MinesStart { request_id, .. }
            | InboundMessage::MinesReveal { request_id, .. }
            | InboundMessage::MinesView { request_id, .. }
            | InboundMessage::MinesCashout { request_id, .. } => request_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceMessage {
    pub real: u64,
    pub demo: u64,
}

/// What one player's wager did in a finished crash round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultMessage {
    pub round_id: u64,
    pub crash_point: Multiplier,
    pub stake: u64,
    pub mode: LedgerMode,
    #[serde(flatten)]
    pub status: SettlementStatus,
    pub balance: u64,
}

/// Pushed to every connected socket; `playerId` marks events meant for one player.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    State {
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        payload: RoundSnapshot,
    },
    RoundResult {
        player_id: String,
        payload: RoundResultMessage,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AckPayload {
    Balance(BalanceMessage),
    Bet(ParticipantView),
    Cashout(CashoutReceipt),
    Mines(MinesView),
    MinesReveal(RevealOutcome),
    MinesCashout(MinesCashout),
}

/// Direct reply to the socket that sent the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundResponse {
    Ack {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<AckPayload>,
    },
    Error {
        request_id: String,
        code: String,
        message: String,
    },
}

pub fn ack(request_id: String, payload: AckPayload) -> OutboundResponse {
    OutboundResponse::Ack {
        request_id,
        payload: Some(payload),
    }
}

pub fn error_response(request_id: String, err: &BetError) -> OutboundResponse {
    OutboundResponse::Error {
        request_id,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_bet_with_auto_cashout() {
        let inbound: InboundMessage = serde_json::from_value(json!({
            "type": "bet",
            "requestId": "r1",
            "playerId": "alice",
            "amount": 1000,
            "mode": "real",
            "autoCashout": 2.5
        }))
        .unwrap();
        assert_eq!(
            inbound,
            InboundMessage::Bet {
                request_id: "r1".to_string(),
                player_id: "alice".to_string(),
                amount: 1_000,
                mode: Some(LedgerMode::Real),
                auto_cashout: Some(Multiplier::from_hundredths(250)),
            }
        );
        assert_eq!(inbound.request_id(), "r1");
    }

    #[test]
    fn test_decodes_mines_messages() {
        let start: InboundMessage = serde_json::from_str(
            r#"{"type":"mines_start","requestId":"m1","playerId":"bob","amount":50,"mines":3}"#,
        )
        .unwrap();
        assert!(matches!(
            start,
            InboundMessage::MinesStart { mines: 3, mode: None, amount: 50, .. }
        ));

        let reveal: InboundMessage = serde_json::from_str(
            r#"{"type":"mines_reveal","requestId":"m2","playerId":"bob","cell":12}"#,
        )
        .unwrap();
        assert!(matches!(reveal, InboundMessage::MinesReveal { cell: 12, .. }));

        let view: InboundMessage = serde_json::from_str(
            r#"{"type":"mines_view","requestId":"m3","playerId":"bob"}"#,
        )
        .unwrap();
        assert_eq!(view.request_id(), "m3");
        assert!(matches!(view, InboundMessage::MinesView { .. }));
    }

    #[test]
    fn test_rejects_unknown_type_and_bad_multiplier() {
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"leave","requestId":"x"}"#).is_err());
        assert!(serde_json::from_value::<InboundMessage>(json!({
            "type": "bet",
            "requestId": "r",
            "playerId": "p",
            "amount": 10,
            "autoCashout": -2.0
        }))
        .is_err());
    }

    #[test]
    fn test_error_response_uses_codes() {
        let response = error_response("r9".to_string(), &BetError::BettingClosed);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "type": "error",
                "requestId": "r9",
                "code": "BETTING_CLOSED",
                "message": "betting is closed for this round"
            })
        );
    }

    #[test]
    fn test_round_result_shape() {
        let event = OutboundEvent::RoundResult {
            player_id: "alice".to_string(),
            payload: RoundResultMessage {
                round_id: 7,
                crash_point: Multiplier::from_hundredths(300),
                stake: 1_000,
                mode: LedgerMode::Real,
                status: SettlementStatus::Won { win_amount: 2_500 },
                balance: 11_500,
            },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "round_result",
                "playerId": "alice",
                "payload": {
                    "roundId": 7,
                    "crashPoint": 3.0,
                    "stake": 1000,
                    "mode": "real",
                    "status": "won",
                    "winAmount": 2500,
                    "balance": 11500
                }
            })
        );
    }

    #[test]
    fn test_balance_ack_shape() {
        let response = ack(
            "b1".to_string(),
            AckPayload::Balance(BalanceMessage { real: 5, demo: 100 }),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "type": "ack",
                "requestId": "b1",
                "payload": {"real": 5, "demo": 100}
            })
        );
    }
}
