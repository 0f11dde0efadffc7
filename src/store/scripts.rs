//! Server-side settlement scripts.
//!
//! Multi-key read-check-write runs inside the store in one atomic step;
//! these scripts are the sole writers to asset hashes during live trading.
//! Amounts are marshalled as fixed-point integers (x10^8) so the scripts
//! stay integer-only.

use std::time::Duration;

/// Per-evaluation time budget. Exceeding it surfaces as a settlement
/// failure and is escalated by the matching lane.
pub const TIME_BUDGET: Duration = Duration::from_millis(100);

/// A named server-side script. The name doubles as the dispatch key for the
/// in-memory store implementation.
#[derive(Debug, Clone, Copy)]
pub struct AtomicScript {
    pub name: &'static str,
    pub source: &'static str,
}

/// KEYS[1] = asset hash. ARGV[1] = amount, ARGV[2] = now (ms).
/// Moves available -> frozen; returns 0 when available is short.
pub const FREEZE: AtomicScript = AtomicScript {
    name: "freeze",
    source: r#"
local amount = tonumber(ARGV[1])
local available = tonumber(redis.call('HGET', KEYS[1], 'available') or '0')
if available < amount then
  return 0
end
redis.call('HINCRBY', KEYS[1], 'available', -amount)
redis.call('HINCRBY', KEYS[1], 'frozen', amount)
redis.call('HSET', KEYS[1], 'updated_at', ARGV[2])
return 1
"#,
};

/// KEYS[1] = asset hash. ARGV[1] = amount, ARGV[2] = now (ms).
/// Moves frozen -> available; returns 0 when frozen is short.
pub const UNFREEZE: AtomicScript = AtomicScript {
    name: "unfreeze",
    source: r#"
local amount = tonumber(ARGV[1])
local frozen = tonumber(redis.call('HGET', KEYS[1], 'frozen') or '0')
if frozen < amount then
  return 0
end
redis.call('HINCRBY', KEYS[1], 'frozen', -amount)
redis.call('HINCRBY', KEYS[1], 'available', amount)
redis.call('HSET', KEYS[1], 'updated_at', ARGV[2])
return 1
"#,
};

/// KEYS = [buyer quote, buyer base, seller base, seller quote] asset hashes.
/// ARGV[1] = cost (quote), ARGV[2] = quantity (base), ARGV[3] = now (ms).
/// Requires buyer frozen quote >= cost and seller frozen base >= quantity.
pub const EXECUTE_TRADE: AtomicScript = AtomicScript {
    name: "execute_trade",
    source: r#"
local cost = tonumber(ARGV[1])
local qty = tonumber(ARGV[2])
local buyer_quote = tonumber(redis.call('HGET', KEYS[1], 'frozen') or '0')
if buyer_quote < cost then
  return 0
end
local seller_base = tonumber(redis.call('HGET', KEYS[3], 'frozen') or '0')
if seller_base < qty then
  return 0
end
redis.call('HINCRBY', KEYS[1], 'frozen', -cost)
redis.call('HINCRBY', KEYS[2], 'available', qty)
redis.call('HINCRBY', KEYS[3], 'frozen', -qty)
redis.call('HINCRBY', KEYS[4], 'available', cost)
for i = 1, 4 do
  redis.call('HSET', KEYS[i], 'updated_at', ARGV[3])
end
return 1
"#,
};
