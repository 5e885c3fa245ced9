use nodeshare_common::{
    crypto::{Address, Hash},
    referral::PurchaseId,
    serializer::Serializer,
    time::TimestampMillis,
};
use strum::{AsRefStr, Display, EnumIter};

// Every address, purchase id and tier name is length-prefixed in keys,
// so scanning `{wallet}` never matches rows of a longer wallet address.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash, EnumIter, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Column {
    // {wallet} => {wallet}
    Wallets,
    // Denormalized ancestors, depth 0 is the direct parent
    // {wallet}{depth} => {ancestor}
    HierarchyEdges,
    // {parent}{child} => {joined_at}
    DirectReferrals,

    // Append-only commission ledger
    // {purchase_id}{recipient} => {commission record}
    CommissionRecords,
    // Reverse index for history listing
    // {recipient}{created_at}{purchase_id} => {commission record}
    CommissionsByRecipient,
    // Idempotency markers
    // {purchase_id} => {purchase receipt}
    AppliedPurchases,

    // {withdrawal_id} => {withdrawal record}
    Withdrawals,
    // {wallet}{created_at}{withdrawal_id} => {}
    WithdrawalsByWallet,

    // {tier_name} => {member level config}
    MemberLevels,
    // {wallet} => {commission settings}
    CommissionSettings,
}

pub fn edge_key(wallet: &Address, depth: u8) -> Vec<u8> {
    let mut key = wallet.to_key();
    key.push(depth);
    key
}

pub fn direct_referral_key(parent: &Address, child: &Address) -> Vec<u8> {
    let mut key = parent.to_key();
    key.extend(child.to_key());
    key
}

pub fn commission_key(purchase_id: &PurchaseId, recipient: &Address) -> Vec<u8> {
    let mut key = purchase_id.to_key();
    key.extend(recipient.to_key());
    key
}

pub fn commission_by_recipient_key(
    recipient: &Address,
    created_at: TimestampMillis,
    purchase_id: &PurchaseId,
) -> Vec<u8> {
    let mut key = recipient.to_key();
    key.extend(created_at.to_be_bytes());
    key.extend(purchase_id.to_key());
    key
}

pub fn withdrawal_by_wallet_key(
    wallet: &Address,
    created_at: TimestampMillis,
    id: &Hash,
) -> Vec<u8> {
    let mut key = wallet.to_key();
    key.extend(created_at.to_be_bytes());
    key.extend(id.as_bytes());
    key
}

pub fn tier_key(name: &str) -> Vec<u8> {
    name.to_string().to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_column_names() {
        assert_eq!(Column::HierarchyEdges.to_string(), "hierarchy_edges");
        assert_eq!(Column::iter().count(), 10);
    }

    #[test]
    fn test_edge_keys_sort_by_depth() {
        let wallet = Address::new("w").unwrap();
        let mut keys = vec![edge_key(&wallet, 10), edge_key(&wallet, 2), edge_key(&wallet, 0)];
        keys.sort();
        assert_eq!(keys[0], edge_key(&wallet, 0));
        assert_eq!(keys[2], edge_key(&wallet, 10));
    }
}
