use serde::Deserialize;
use serde::Serialize;

/// Which deck a card belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeckType {
    Chance,
    CommunityChest,
}

impl std::fmt::Display for DeckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chance => write!(f, "CHANCE"),
            Self::CommunityChest => write!(f, "COMMUNITY_CHEST"),
        }
    }
}

/// One card from either deck. Card ids are the wire identifiers used in
/// `CARD_DRAWN` payloads and deck bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Card {
    AdvanceToGo,
    GoToIllinoisAve,
    GoToStCharlesPlace,
    GoToNearestUtility,
    GoToNearestRailroadA,
    GoToNearestRailroadB,
    BankPaysYouDividend50,
    GetOutOfJailFree,
    GoBack3Spaces,
    GoToJail,
    GeneralRepairs,
    PayPoorTax15,
    TakeTripToReadingRr,
    AdvanceToBoardwalk,
    ElectedChairmanPayEachPlayer50,
    BuildingLoanMaturesReceive150,
    BankErrorCollect200,
    DoctorFeePay50,
    SaleOfStockCollect50,
    HolidayFundReceive100,
    IncomeTaxRefundCollect20,
    BirthdayCollect10FromEachPlayer,
    LifeInsuranceCollect100,
    HospitalFeesPay100,
    SchoolFeesPay50,
    ConsultancyFeeCollect25,
    StreetRepairs,
    BeautyContestCollect10,
    Inherit100,
}

impl Card {
    /// Stable wire identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Self::AdvanceToGo => "ADVANCE_TO_GO",
            Self::GoToIllinoisAve => "GO_TO_ILLINOIS_AVE",
            Self::GoToStCharlesPlace => "GO_TO_ST_CHARLES_PLACE",
            Self::GoToNearestUtility => "GO_TO_NEAREST_UTILITY",
            Self::GoToNearestRailroadA => "GO_TO_NEAREST_RAILROAD_A",
            Self::GoToNearestRailroadB => "GO_TO_NEAREST_RAILROAD_B",
            Self::BankPaysYouDividend50 => "BANK_PAYS_YOU_DIVIDEND_50",
            Self::GetOutOfJailFree => "GET_OUT_OF_JAIL_FREE",
            Self::GoBack3Spaces => "GO_BACK_3_SPACES",
            Self::GoToJail => "GO_TO_JAIL",
            Self::GeneralRepairs => "GENERAL_REPAIRS",
            Self::PayPoorTax15 => "PAY_POOR_TAX_15",
            Self::TakeTripToReadingRr => "TAKE_TRIP_TO_READING_RR",
            Self::AdvanceToBoardwalk => "ADVANCE_TO_BOARDWALK",
            Self::ElectedChairmanPayEachPlayer50 => "ELECTED_CHAIRMAN_PAY_EACH_PLAYER_50",
            Self::BuildingLoanMaturesReceive150 => "BUILDING_LOAN_MATURES_RECEIVE_150",
            Self::BankErrorCollect200 => "BANK_ERROR_COLLECT_200",
            Self::DoctorFeePay50 => "DOCTOR_FEE_PAY_50",
            Self::SaleOfStockCollect50 => "SALE_OF_STOCK_COLLECT_50",
            Self::HolidayFundReceive100 => "HOLIDAY_FUND_RECEIVE_100",
            Self::IncomeTaxRefundCollect20 => "INCOME_TAX_REFUND_COLLECT_20",
            Self::BirthdayCollect10FromEachPlayer => "BIRTHDAY_COLLECT_10_FROM_EACH_PLAYER",
            Self::LifeInsuranceCollect100 => "LIFE_INSURANCE_COLLECT_100",
            Self::HospitalFeesPay100 => "HOSPITAL_FEES_PAY_100",
            Self::SchoolFeesPay50 => "SCHOOL_FEES_PAY_50",
            Self::ConsultancyFeeCollect25 => "CONSULTANCY_FEE_COLLECT_25",
            Self::StreetRepairs => "STREET_REPAIRS",
            Self::BeautyContestCollect10 => "BEAUTY_CONTEST_COLLECT_10",
            Self::Inherit100 => "INHERIT_100",
        }
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// The Chance deck in canonical (pre-shuffle) order.
pub const CHANCE_CARDS: [Card; 16] = [
    Card::AdvanceToGo,
    Card::GoToIllinoisAve,
    Card::GoToStCharlesPlace,
    Card::GoToNearestUtility,
    Card::GoToNearestRailroadA,
    Card::GoToNearestRailroadB,
    Card::BankPaysYouDividend50,
    Card::GetOutOfJailFree,
    Card::GoBack3Spaces,
    Card::GoToJail,
    Card::GeneralRepairs,
    Card::PayPoorTax15,
    Card::TakeTripToReadingRr,
    Card::AdvanceToBoardwalk,
    Card::ElectedChairmanPayEachPlayer50,
    Card::BuildingLoanMaturesReceive150,
];

/// The Community Chest deck in canonical (pre-shuffle) order.
pub const COMMUNITY_CHEST_CARDS: [Card; 16] = [
    Card::AdvanceToGo,
    Card::BankErrorCollect200,
    Card::DoctorFeePay50,
    Card::SaleOfStockCollect50,
    Card::GetOutOfJailFree,
    Card::GoToJail,
    Card::HolidayFundReceive100,
    Card::IncomeTaxRefundCollect20,
    Card::BirthdayCollect10FromEachPlayer,
    Card::LifeInsuranceCollect100,
    Card::HospitalFeesPay100,
    Card::SchoolFeesPay50,
    Card::ConsultancyFeeCollect25,
    Card::StreetRepairs,
    Card::BeautyContestCollect10,
    Card::Inherit100,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decks_are_full() {
        assert_eq!(CHANCE_CARDS.len(), 16);
        assert_eq!(COMMUNITY_CHEST_CARDS.len(), 16);
    }

    #[test]
    fn one_jail_card_per_deck() {
        let chance = CHANCE_CARDS
            .iter()
            .filter(|c| **c == Card::GetOutOfJailFree)
            .count();
        let chest = COMMUNITY_CHEST_CARDS
            .iter()
            .filter(|c| **c == Card::GetOutOfJailFree)
            .count();
        assert_eq!((chance, chest), (1, 1));
    }

    #[test]
    fn card_ids_are_stable() {
        assert_eq!(Card::PayPoorTax15.id(), "PAY_POOR_TAX_15");
        assert_eq!(Card::GoBack3Spaces.id(), "GO_BACK_3_SPACES");
        assert_eq!(DeckType::CommunityChest.to_string(), "COMMUNITY_CHEST");
    }
}
