//! Channel-specific rendering.
//!
//! Chat messages use the bot platform's extended-markdown flavour, which
//! treats a long list of punctuation as markup; everything user- or
//! market-derived goes through `escape_chat_markup`. The public summary
//! deliberately contains no venues, rates or direction.

use detector::types::Opportunity;

use crate::types::RenderedMessage;

const CHAT_RESERVED: [char; 18] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

pub fn escape_chat_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if CHAT_RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Full trade detail for private delivery.
pub fn render_opportunity(o: &Opportunity) -> RenderedMessage {
    let pair = escape_chat_markup(&o.pair.id());
    let long_venue = escape_chat_markup(o.long_venue.as_str());
    let short_venue = escape_chat_markup(o.short_venue.as_str());

    let text = format!(
        "*Funding arbitrage: {pair}*\n\
         Long {long_venue} at {long} / short {short_venue} at {short}\n\
         Net carry after fees: {net} \\(gross {gross}, fees {fees}\\)\n\
         Valid until epoch\\-ms {expires}",
        long = escape_chat_markup(&o.long_rate.to_string()),
        short = escape_chat_markup(&o.short_rate.to_string()),
        net = escape_chat_markup(&o.net_rate_difference.to_string()),
        gross = escape_chat_markup(&o.gross_difference.to_string()),
        fees = escape_chat_markup(&o.total_fee.to_string()),
        expires = o.expires_at_ms,
    );

    RenderedMessage { text }
}

/// Group-safe replacement: announces existence, carries no trade specifics.
pub fn render_public_summary(o: &Opportunity) -> RenderedMessage {
    let pair = escape_chat_markup(&o.pair.id());
    RenderedMessage {
        text: format!(
            "An opportunity on {pair} is available\\. Check your private chat for details\\."
        ),
    }
}

/// What a user sees when delivery terminally fails; intentionally generic.
pub fn render_delivery_failure() -> RenderedMessage {
    RenderedMessage {
        text: "Something went wrong delivering your notification\\. Please try again later\\."
            .to_string(),
    }
}
