use super::action::BuildKind;
use super::action::PlanItem;
use super::decision::LiquidationOptions;
use super::decision::PostTurnOptions;
use super::engine::Engine;
use super::error::EngineError;
use super::event::Actor;
use super::event::EventBody;
use super::event::EventRecord;
use moa_board::Group;
use moa_core::*;

/// A validated build or sell plan, simulated against a working copy of
/// the board and bank before anything mutates.
#[derive(Debug)]
pub(crate) struct PlanOutcome {
    pub items: Vec<(SpaceIndex, BuildKind, i64)>,
    pub bank_houses_delta: i64,
    pub bank_hotels_delta: i64,
    pub total: Cash,
}

/// Mortgages, unmortgages, and the even-building rules.
impl Engine {
    pub(crate) fn post_turn_options(&self, player_id: &str) -> PostTurnOptions {
        PostTurnOptions {
            can_trade_with: self
                .state
                .players
                .iter()
                .filter(|p| p.player_id != player_id && !p.bankrupt)
                .map(|p| p.player_id.clone())
                .collect(),
            mortgageable_space_indices: self.mortgageable_space_indices(player_id),
            unmortgageable_space_indices: self.unmortgageable_space_indices(player_id),
            buildable_space_indices: self.buildable_space_indices(player_id),
            sellable_building_space_indices: self.sellable_building_space_indices(player_id),
        }
    }

    pub(crate) fn liquidation_options(&self, player_id: &str) -> LiquidationOptions {
        LiquidationOptions {
            mortgageable_space_indices: self.mortgageable_space_indices(player_id),
            sellable_building_space_indices: self.sellable_building_space_indices(player_id),
        }
    }

    pub(crate) fn mortgageable_space_indices(&self, player_id: &str) -> Vec<SpaceIndex> {
        self.state
            .board
            .iter()
            .filter(|space| space.owner_id.as_deref() == Some(player_id))
            .filter(|space| !space.mortgaged && !space.has_buildings())
            .filter(|space| match space.group {
                Some(group) => !self.state.group_has_buildings(group),
                None => true,
            })
            .map(|space| space.index)
            .collect()
    }

    pub(crate) fn unmortgageable_space_indices(&self, player_id: &str) -> Vec<SpaceIndex> {
        let cash = self.state.player(player_id).map(|p| p.cash).unwrap_or(0);
        self.state
            .board
            .iter()
            .filter(|space| space.owner_id.as_deref() == Some(player_id))
            .filter(|space| space.mortgaged && cash >= space.unmortgage_cost())
            .map(|space| space.index)
            .collect()
    }

    /// Spaces eligible for the next building under the even-building
    /// rule: group monopoly held, nothing mortgaged, cash for at least
    /// one unit, and the space sits at the group's minimum level.
    pub(crate) fn buildable_space_indices(&self, player_id: &str) -> Vec<SpaceIndex> {
        let cash = self.state.player(player_id).map(|p| p.cash).unwrap_or(0);
        let mut indices = Vec::new();
        for group in moa_board::buildable_groups() {
            let group_indices = moa_board::group_indices(group);
            if !group_indices
                .iter()
                .all(|&i| self.state.board[i].owner_id.as_deref() == Some(player_id))
            {
                continue;
            }
            if self.state.group_has_mortgaged(group) {
                continue;
            }
            if cash < moa_board::house_cost(group) {
                continue;
            }
            let min_value = group_indices
                .iter()
                .map(|&i| self.state.board[i].building_value())
                .min()
                .unwrap_or(0);
            if min_value >= HOTEL_HOUSE_EQUIV {
                continue;
            }
            for &index in group_indices {
                let space = &self.state.board[index];
                if space.building_value() != min_value || space.hotel {
                    continue;
                }
                if space.houses < HOUSE_LIMIT {
                    if self.state.bank.houses_remaining > 0 {
                        indices.push(index);
                    }
                } else if self.state.bank.hotels_remaining > 0 {
                    indices.push(index);
                }
            }
        }
        indices
    }

    /// Spaces whose buildings may be sold next: the group's maximum
    /// level, and hotels only when the bank can supply four houses.
    pub(crate) fn sellable_building_space_indices(&self, player_id: &str) -> Vec<SpaceIndex> {
        let mut indices = Vec::new();
        for group in moa_board::buildable_groups() {
            let group_indices = moa_board::group_indices(group);
            if !group_indices
                .iter()
                .all(|&i| self.state.board[i].owner_id.as_deref() == Some(player_id))
            {
                continue;
            }
            let max_value = group_indices
                .iter()
                .map(|&i| self.state.board[i].building_value())
                .max()
                .unwrap_or(0);
            if max_value <= 0 {
                continue;
            }
            for &index in group_indices {
                let space = &self.state.board[index];
                if space.building_value() != max_value {
                    continue;
                }
                if space.hotel {
                    if self.state.bank.houses_remaining >= HOUSE_LIMIT {
                        indices.push(index);
                    }
                } else if space.houses > 0 {
                    indices.push(index);
                }
            }
        }
        indices
    }

    pub(crate) fn check_mortgage(
        &self,
        player_id: &str,
        space_key: &str,
    ) -> Result<SpaceIndex, EngineError> {
        let index = moa_board::space_index(space_key)
            .ok_or_else(|| EngineError::illegal("unknown space_key for mortgage"))?;
        let space = &self.state.board[index];
        if space.owner_id.as_deref() != Some(player_id) {
            return Err(EngineError::illegal("cannot mortgage unowned property"));
        }
        if space.mortgaged {
            return Err(EngineError::illegal("property already mortgaged"));
        }
        if space.has_buildings() {
            return Err(EngineError::illegal("cannot mortgage property with buildings"));
        }
        if let Some(group) = space.group {
            if self.state.group_has_buildings(group) {
                return Err(EngineError::illegal("cannot mortgage while group has buildings"));
            }
        }
        Ok(index)
    }

    pub(crate) fn apply_mortgage(
        &mut self,
        player_id: &str,
        space_key: &str,
        events: &mut Vec<EventRecord>,
    ) {
        let index = self
            .check_mortgage(player_id, space_key)
            .expect("validated mortgage");
        let value = self.state.board[index].mortgage_value();
        self.state.board[index].mortgaged = true;
        self.cash_delta(player_id, value, "MORTGAGE", events);
        let event = self.event(
            Actor::player(player_id),
            EventBody::PropertyMortgaged {
                player_id: player_id.to_string(),
                space_index: index,
                amount: value,
            },
        );
        events.push(event);
    }

    pub(crate) fn check_unmortgage(
        &self,
        player_id: &str,
        space_key: &str,
    ) -> Result<SpaceIndex, EngineError> {
        let index = moa_board::space_index(space_key)
            .ok_or_else(|| EngineError::illegal("unknown space_key for unmortgage"))?;
        let space = &self.state.board[index];
        if space.owner_id.as_deref() != Some(player_id) {
            return Err(EngineError::illegal("cannot unmortgage unowned property"));
        }
        if !space.mortgaged {
            return Err(EngineError::illegal("property not mortgaged"));
        }
        let cash = self.state.player(player_id).map(|p| p.cash).unwrap_or(0);
        if cash < space.unmortgage_cost() {
            return Err(EngineError::illegal("insufficient cash to unmortgage"));
        }
        Ok(index)
    }

    pub(crate) fn apply_unmortgage(
        &mut self,
        player_id: &str,
        space_key: &str,
        events: &mut Vec<EventRecord>,
    ) {
        let index = self
            .check_unmortgage(player_id, space_key)
            .expect("validated unmortgage");
        let cost = self.state.board[index].unmortgage_cost();
        self.state.board[index].mortgaged = false;
        self.cash_delta(player_id, -cost, "UNMORTGAGE", events);
        let event = self.event(
            Actor::player(player_id),
            EventBody::PropertyUnmortgaged {
                player_id: player_id.to_string(),
                space_index: index,
                amount: cost,
            },
        );
        events.push(event);
    }

    pub(crate) fn check_build_plan(
        &self,
        player_id: &str,
        plan: &[PlanItem],
    ) -> Result<PlanOutcome, EngineError> {
        let mut working: Vec<(i64, bool)> = self
            .state
            .board
            .iter()
            .map(|s| (s.houses, s.hotel))
            .collect();
        let mut outcome = PlanOutcome {
            items: Vec::new(),
            bank_houses_delta: 0,
            bank_hotels_delta: 0,
            total: 0,
        };
        let mut touched: Vec<Group> = Vec::new();

        for item in plan {
            let index = moa_board::space_index(&item.space_key)
                .ok_or_else(|| EngineError::illegal("unknown space_key in build plan"))?;
            let space = &self.state.board[index];
            if space.owner_id.as_deref() != Some(player_id) {
                return Err(EngineError::illegal("cannot build on unowned property"));
            }
            let group = match space.group {
                Some(group) if group.is_buildable() => group,
                _ => return Err(EngineError::illegal("invalid build target")),
            };
            if !moa_board::group_indices(group)
                .iter()
                .all(|&i| self.state.board[i].owner_id.as_deref() == Some(player_id))
            {
                return Err(EngineError::illegal("cannot build without monopoly"));
            }
            if self.state.group_has_mortgaged(group) {
                return Err(EngineError::illegal("cannot build on mortgaged group"));
            }
            let house_cost = moa_board::house_cost(group);
            let (houses, hotel) = working[index];
            match item.kind {
                BuildKind::House => {
                    if hotel {
                        return Err(EngineError::illegal("cannot build house on hotel"));
                    }
                    if houses + item.count > HOUSE_LIMIT {
                        return Err(EngineError::illegal("too many houses"));
                    }
                    working[index] = (houses + item.count, false);
                    outcome.bank_houses_delta -= item.count;
                    outcome.total += house_cost * item.count;
                }
                BuildKind::Hotel => {
                    if item.count != 1 {
                        return Err(EngineError::illegal("hotel build count must be 1"));
                    }
                    if hotel || houses != HOUSE_LIMIT {
                        return Err(EngineError::illegal("hotel requires four houses"));
                    }
                    working[index] = (0, true);
                    outcome.bank_hotels_delta -= 1;
                    outcome.bank_houses_delta += HOUSE_LIMIT;
                    outcome.total += house_cost;
                }
            }
            outcome.items.push((index, item.kind, item.count));
            if !touched.contains(&group) {
                touched.push(group);
            }
        }

        if self.state.bank.houses_remaining + outcome.bank_houses_delta < 0 {
            return Err(EngineError::illegal("bank houses exhausted"));
        }
        if self.state.bank.hotels_remaining + outcome.bank_hotels_delta < 0 {
            return Err(EngineError::illegal("bank hotels exhausted"));
        }
        let cash = self.state.player(player_id).map(|p| p.cash).unwrap_or(0);
        if cash < outcome.total {
            return Err(EngineError::illegal("insufficient cash to build"));
        }
        Self::check_even(&working, &touched)?;
        Ok(outcome)
    }

    pub(crate) fn apply_build_plan(
        &mut self,
        player_id: &str,
        plan: &[PlanItem],
        events: &mut Vec<EventRecord>,
    ) {
        let outcome = self
            .check_build_plan(player_id, plan)
            .expect("validated build plan");
        self.state.bank.houses_remaining += outcome.bank_houses_delta;
        self.state.bank.hotels_remaining += outcome.bank_hotels_delta;
        if outcome.total > 0 {
            self.cash_delta(player_id, -outcome.total, "BUILD", events);
        }
        for (index, kind, count) in outcome.items {
            match kind {
                BuildKind::House => {
                    self.state.board[index].houses += count;
                    let event = self.event(
                        Actor::player(player_id),
                        EventBody::HouseBuilt {
                            player_id: player_id.to_string(),
                            space_index: index,
                            count,
                        },
                    );
                    events.push(event);
                }
                BuildKind::Hotel => {
                    let space = &mut self.state.board[index];
                    space.houses = 0;
                    space.hotel = true;
                    let event = self.event(
                        Actor::player(player_id),
                        EventBody::HotelBuilt {
                            player_id: player_id.to_string(),
                            space_index: index,
                            count,
                        },
                    );
                    events.push(event);
                }
            }
        }
    }

    pub(crate) fn check_sell_plan(
        &self,
        player_id: &str,
        plan: &[PlanItem],
    ) -> Result<PlanOutcome, EngineError> {
        let mut working: Vec<(i64, bool)> = self
            .state
            .board
            .iter()
            .map(|s| (s.houses, s.hotel))
            .collect();
        let mut outcome = PlanOutcome {
            items: Vec::new(),
            bank_houses_delta: 0,
            bank_hotels_delta: 0,
            total: 0,
        };
        let mut touched: Vec<Group> = Vec::new();

        for item in plan {
            let index = moa_board::space_index(&item.space_key)
                .ok_or_else(|| EngineError::illegal("unknown space_key in sell plan"))?;
            let space = &self.state.board[index];
            if space.owner_id.as_deref() != Some(player_id) {
                return Err(EngineError::illegal("cannot sell on unowned property"));
            }
            let group = match space.group {
                Some(group) if group.is_buildable() => group,
                _ => return Err(EngineError::illegal("invalid sell target")),
            };
            let house_cost = moa_board::house_cost(group);
            let (houses, hotel) = working[index];
            match item.kind {
                BuildKind::House => {
                    if hotel {
                        return Err(EngineError::illegal("cannot sell house from hotel"));
                    }
                    if houses < item.count {
                        return Err(EngineError::illegal("not enough houses to sell"));
                    }
                    working[index] = (houses - item.count, false);
                    outcome.bank_houses_delta += item.count;
                    outcome.total += house_cost * item.count / 2;
                }
                BuildKind::Hotel => {
                    if item.count != 1 {
                        return Err(EngineError::illegal("hotel sell count must be 1"));
                    }
                    if !hotel {
                        return Err(EngineError::illegal("no hotel to sell"));
                    }
                    working[index] = (HOUSE_LIMIT, false);
                    outcome.bank_hotels_delta += 1;
                    outcome.bank_houses_delta -= HOUSE_LIMIT;
                    outcome.total += house_cost / 2;
                }
            }
            outcome.items.push((index, item.kind, item.count));
            if !touched.contains(&group) {
                touched.push(group);
            }
        }

        if self.state.bank.houses_remaining + outcome.bank_houses_delta < 0 {
            return Err(EngineError::illegal("insufficient bank houses for hotel sale"));
        }
        Self::check_even(&working, &touched)?;
        Ok(outcome)
    }

    pub(crate) fn apply_sell_plan(
        &mut self,
        player_id: &str,
        plan: &[PlanItem],
        events: &mut Vec<EventRecord>,
    ) {
        let outcome = self
            .check_sell_plan(player_id, plan)
            .expect("validated sell plan");
        self.state.bank.houses_remaining += outcome.bank_houses_delta;
        self.state.bank.hotels_remaining += outcome.bank_hotels_delta;
        if outcome.total > 0 {
            self.cash_delta(player_id, outcome.total, "SELL_BUILDING", events);
        }
        for (index, kind, count) in outcome.items {
            match kind {
                BuildKind::House => {
                    self.state.board[index].houses -= count;
                    let event = self.event(
                        Actor::player(player_id),
                        EventBody::HouseSold {
                            player_id: player_id.to_string(),
                            space_index: index,
                            count,
                        },
                    );
                    events.push(event);
                }
                BuildKind::Hotel => {
                    let space = &mut self.state.board[index];
                    space.hotel = false;
                    space.houses = HOUSE_LIMIT;
                    let event = self.event(
                        Actor::player(player_id),
                        EventBody::HotelSold {
                            player_id: player_id.to_string(),
                            space_index: index,
                            count,
                        },
                    );
                    events.push(event);
                }
            }
        }
    }

    /// Even-building rule over the simulated board: within each touched
    /// group, building values may differ by at most one.
    fn check_even(working: &[(i64, bool)], touched: &[Group]) -> Result<(), EngineError> {
        for &group in touched {
            let values: Vec<i64> = moa_board::group_indices(group)
                .iter()
                .map(|&i| {
                    let (houses, hotel) = working[i];
                    if hotel { HOTEL_HOUSE_EQUIV } else { houses }
                })
                .collect();
            let max = values.iter().copied().max().unwrap_or(0);
            let min = values.iter().copied().min().unwrap_or(0);
            if max - min > 1 {
                return Err(EngineError::illegal("uneven building across group"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::action::ActionEnvelope;
    use super::super::action::ActionName;
    use super::super::engine::EngineConfig;
    use super::*;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::new(
            EngineConfig::new(
                11,
                "run-build",
                vec![("p1".into(), "P1".into()), ("p2".into(), "P2".into())],
            )
            .with_max_turns(5)
            .with_timestamps(0, 1),
        )
    }

    fn own_brown(engine: &mut Engine, player: &str) {
        engine.state_mut().board[1].owner_id = Some(player.to_string());
        engine.state_mut().board[3].owner_id = Some(player.to_string());
    }

    fn post_turn_decision(engine: &mut Engine) -> super::super::decision::DecisionPoint {
        engine.state_mut().active_player_id = "p1".into();
        let decision = engine.build_post_turn_decision("p1");
        let mut events = Vec::new();
        engine.issue(decision, None, false, &mut events)
    }

    #[test]
    fn build_requires_monopoly() {
        let mut engine = engine();
        engine.state_mut().board[1].owner_id = Some("p1".into());
        engine.state_mut().board[3].owner_id = Some("p2".into());
        let options = engine.post_turn_options("p1");
        assert!(options.buildable_space_indices.is_empty());
    }

    #[test]
    fn build_blocked_by_mortgaged_group() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        engine.state_mut().board[1].mortgaged = true;
        let options = engine.post_turn_options("p1");
        assert!(options.buildable_space_indices.is_empty());
    }

    #[test]
    fn mortgage_blocked_with_buildings_in_group() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        engine.state_mut().board[1].houses = 1;
        let options = engine.post_turn_options("p1");
        assert!(options.mortgageable_space_indices.is_empty());
    }

    #[test]
    fn uneven_build_plan_is_rejected() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        let decision = post_turn_decision(&mut engine);
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::BuildHousesOrHotel)
            .with_args(json!({
                "build_plan": [{"space_key": "MEDITERRANEAN_AVENUE", "kind": "HOUSE", "count": 2}]
            }));
        assert!(engine.apply_action(&action, None).is_err());
    }

    #[test]
    fn balanced_build_plan_is_accepted() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        let decision = post_turn_decision(&mut engine);
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::BuildHousesOrHotel)
            .with_args(json!({
                "build_plan": [
                    {"space_key": "MEDITERRANEAN_AVENUE", "kind": "HOUSE", "count": 2},
                    {"space_key": "BALTIC_AVENUE", "kind": "HOUSE", "count": 2}
                ]
            }));
        engine.apply_action(&action, None).unwrap();
        assert_eq!(engine.state().board[1].houses, 2);
        assert_eq!(engine.state().board[3].houses, 2);
        assert_eq!(engine.state().bank.houses_remaining, BANK_HOUSES - 4);
        assert_eq!(engine.state().player("p1").unwrap().cash, 1500 - 200);
    }

    #[test]
    fn hotel_build_returns_houses_to_bank() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        engine.state_mut().board[1].houses = 4;
        engine.state_mut().board[3].houses = 4;
        let houses_before = engine.state().bank.houses_remaining;
        let hotels_before = engine.state().bank.hotels_remaining;

        let decision = post_turn_decision(&mut engine);
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::BuildHousesOrHotel)
            .with_args(json!({
                "build_plan": [{"space_key": "MEDITERRANEAN_AVENUE", "kind": "HOTEL", "count": 1}]
            }));
        engine.apply_action(&action, None).unwrap();

        let space = &engine.state().board[1];
        assert!(space.hotel);
        assert_eq!(space.houses, 0);
        assert_eq!(engine.state().bank.hotels_remaining, hotels_before - 1);
        assert_eq!(engine.state().bank.houses_remaining, houses_before + 4);
        assert_eq!(engine.state().player("p1").unwrap().cash, 1500 - 50);
    }

    #[test]
    fn bank_house_shortage_blocks_building() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        engine.state_mut().bank.houses_remaining = 0;
        let options = engine.post_turn_options("p1");
        assert!(options.buildable_space_indices.is_empty());
    }

    #[test]
    fn hotel_sale_requires_bank_houses() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        engine.state_mut().board[1].hotel = true;
        engine.state_mut().bank.houses_remaining = 3;
        let options = engine.post_turn_options("p1");
        assert!(options.sellable_building_space_indices.is_empty());
    }

    #[test]
    fn mortgage_and_unmortgage_round_trip() {
        let mut engine = engine();
        engine.state_mut().board[1].owner_id = Some("p1".into());

        let decision = post_turn_decision(&mut engine);
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::MortgageProperty)
            .with_args(json!({"space_key": "MEDITERRANEAN_AVENUE"}));
        let result = engine.apply_action(&action, None).unwrap();
        assert!(engine.state().board[1].mortgaged);
        assert_eq!(engine.state().player("p1").unwrap().cash, 1530);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(&e.body, EventBody::PropertyMortgaged { amount: 30, .. })));

        engine.state_mut().player_mut("p1").unwrap().cash = 100;
        let decision = post_turn_decision(&mut engine);
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::UnmortgageProperty)
            .with_args(json!({"space_key": "MEDITERRANEAN_AVENUE"}));
        let result = engine.apply_action(&action, None).unwrap();
        assert!(!engine.state().board[1].mortgaged);
        assert_eq!(engine.state().player("p1").unwrap().cash, 100 - 33);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(&e.body, EventBody::PropertyUnmortgaged { amount: 33, .. })));
    }

    #[test]
    fn sell_house_pays_half_price() {
        let mut engine = engine();
        own_brown(&mut engine, "p1");
        engine.state_mut().board[1].houses = 1;
        engine.state_mut().board[3].houses = 1;
        let decision = post_turn_decision(&mut engine);
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::SellHousesOrHotel)
            .with_args(json!({
                "sell_plan": [{"space_key": "BALTIC_AVENUE", "kind": "HOUSE", "count": 1}]
            }));
        engine.apply_action(&action, None).unwrap();
        assert_eq!(engine.state().board[3].houses, 0);
        assert_eq!(engine.state().player("p1").unwrap().cash, 1500 + 25);
        assert_eq!(engine.state().bank.houses_remaining, BANK_HOUSES + 1);
    }
}
