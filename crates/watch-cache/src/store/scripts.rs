//! Lua scripts for the check-then-write steps that must not interleave

/// `KEYS[1]` set, `KEYS[2]` guard set, `ARGV[1]` member
pub(super) const SREM_UNLESS_GUARDED: &str = r"
if redis.call('SCARD', KEYS[2]) > 0 then
    return 0
end
return redis.call('SREM', KEYS[1], ARGV[1])
";

/// `KEYS` item hash, votes set, voters set; `ARGV` item id, voter, id field, ended field
pub(super) const VOTE_ITEM_END: &str = r"
if redis.call('HGET', KEYS[1], ARGV[3]) ~= ARGV[1] then
    return 0
end
if redis.call('HEXISTS', KEYS[1], ARGV[4]) == 1 then
    return 0
end
redis.call('SADD', KEYS[2], ARGV[2])
if redis.call('SCARD', KEYS[2]) < math.floor(redis.call('SCARD', KEYS[3]) / 2) then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[4], '1')
redis.call('DEL', KEYS[2])
return 1
";

/// One voter reporting the end of the playing item
///
/// The vote counts only while `item_key` still holds `item_id`. Once the votes
/// reach half the voters the item is marked ended, the votes are cleared and
/// exactly one caller wins the advance.
#[derive(Debug, Clone, Copy)]
pub struct EndVote<'a> {
    /// Hash of the playing item
    pub item_key: &'a str,
    pub item_id: &'a str,
    /// Set of voters so far
    pub votes_key: &'a str,
    /// Set whose size decides the quorum
    pub voters_key: &'a str,
    pub voter: &'a str,
}

/// Whether `votes` out of `voters` carry the advance
pub(super) fn quorum(votes: usize, voters: usize) -> bool {
    votes >= voters / 2
}
