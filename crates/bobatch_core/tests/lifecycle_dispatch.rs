use bobatch_core::{
    ApprovalManager, ApprovalProcess, BoRepository, BoRepositoryService, BusinessObject,
    DbSource, LifecycleDispatcher, LogicChainRegistry, LogicsRegistry, RepoError, RepoResult,
    RepositoryConfig, RequiredFieldsRule, RuleViolation, RulesRegistry, SaveActionHook,
    SaveActionType, User,
};
use std::sync::{Arc, Mutex};

fn service_with(
    config: &RepositoryConfig,
    customize: impl FnOnce(LifecycleDispatcher) -> LifecycleDispatcher,
) -> BoRepositoryService {
    let registry = Arc::new(LogicChainRegistry::new(Arc::new(LogicsRegistry::new())));
    let dispatcher = customize(LifecycleDispatcher::new(registry));
    let mut service =
        BoRepositoryService::new(BoRepository::new(DbSource::Memory, config), dispatcher);
    service.repository_mut().open_db_connection().unwrap();
    service
}

fn plain_service() -> BoRepositoryService {
    service_with(&RepositoryConfig::default(), |dispatcher| dispatcher)
}

fn row_count(service: &BoRepositoryService, table: &str) -> i64 {
    service
        .repository()
        .connection()
        .unwrap()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
}

#[test]
fn referenced_object_cannot_be_hard_deleted() {
    let mut service = plain_service();
    let mut bo = BusinessObject::existing("Material", 12);
    bo.capabilities.referenced = Some(true);
    bo.mark_deleted();

    let err = service.save(&mut bo).unwrap_err();
    assert!(matches!(err, RepoError::NotAllowedDelete(_)));
    assert!(bo.is_dirty());
    assert_eq!(row_count(&service, "bo_transactions"), 0);
    assert!(!service.repository().in_transaction());
}

#[test]
fn unreferenced_flag_allows_delete() {
    let mut service = plain_service();
    let mut bo = BusinessObject::existing("Material", 12);
    bo.capabilities.referenced = Some(false);
    bo.mark_deleted();

    assert!(service.save(&mut bo).unwrap());
    assert_eq!(row_count(&service, "bo_transactions"), 1);
}

fn customer_rules() -> Arc<RulesRegistry> {
    let mut rules = RulesRegistry::new();
    rules.register("Customer", Arc::new(RequiredFieldsRule::new(["name"])));
    rules.register("Contact", Arc::new(RequiredFieldsRule::new(["email"])));
    Arc::new(rules)
}

#[test]
fn rule_violation_stops_save_before_any_statement() {
    let mut service = service_with(&RepositoryConfig::default(), |dispatcher| {
        dispatcher.with_rules(customer_rules())
    });
    let mut customer = BusinessObject::new("Customer");

    let err = service.save(&mut customer).unwrap_err();
    assert!(matches!(err, RepoError::RuleViolation(ref violation) if violation.rule == "required"));
    assert_eq!(row_count(&service, "bo_records"), 0);
    assert!(customer.is_new());
}

#[test]
fn rules_apply_to_children_reached_through_savable_fields() {
    let mut service = service_with(&RepositoryConfig::default(), |dispatcher| {
        dispatcher.with_rules(customer_rules())
    });
    let mut customer = BusinessObject::new("Customer");
    customer.set_value("name", "ACME");
    customer.push_child("contacts", BusinessObject::new("Contact"));

    let err = service.save(&mut customer).unwrap_err();
    assert!(matches!(err, RepoError::RuleViolation(_)));
    assert_eq!(row_count(&service, "bo_records"), 0);
}

#[test]
fn disabled_rules_are_not_checked() {
    let config = RepositoryConfig {
        check_rules: false,
        ..RepositoryConfig::default()
    };
    let mut service = service_with(&config, |dispatcher| dispatcher.with_rules(customer_rules()));
    let mut customer = BusinessObject::new("Customer");

    assert!(service.save(&mut customer).unwrap());
    assert_eq!(row_count(&service, "bo_records"), 1);
}

fn positive_balance(bo: &BusinessObject) -> Result<(), RuleViolation> {
    match bo.value("balance").and_then(|value| value.as_i64()) {
        Some(balance) if balance < 0 => Err(RuleViolation::new(
            "positive_balance",
            bo,
            "balance must not be negative",
        )),
        _ => Ok(()),
    }
}

#[test]
fn self_check_runs_after_registered_rules() {
    let mut service = plain_service();
    let mut account = BusinessObject::new("Account");
    account.capabilities.self_check = Some(positive_balance);
    account.set_value("balance", -5);

    let err = service.save(&mut account).unwrap_err();
    assert!(matches!(
        err,
        RepoError::RuleViolation(ref violation) if violation.rule == "positive_balance"
    ));

    account.set_value("balance", 5);
    assert!(service.save(&mut account).unwrap());
}

#[derive(Default)]
struct RecordingHook {
    events: Mutex<Vec<(SaveActionType, String)>>,
}

impl SaveActionHook for RecordingHook {
    fn on_save_action(
        &self,
        action: SaveActionType,
        trigger: &mut BusinessObject,
        _repository: &mut BoRepository,
    ) -> RepoResult<bool> {
        self.events
            .lock()
            .unwrap()
            .push((action, trigger.object_code().to_string()));
        Ok(true)
    }
}

#[test]
fn events_fire_pre_order_before_and_post_order_after() {
    let hook = Arc::new(RecordingHook::default());
    let mut service = BoRepositoryService::with_hook(
        BoRepository::new(DbSource::Memory, &RepositoryConfig::default()),
        hook.clone(),
    );
    let mut order = BusinessObject::new("SalesOrder");
    order.push_child("lines", BusinessObject::new("SalesOrderLine"));
    order.set_child("memo", Some(BusinessObject::new("Memo")));

    service.save(&mut order).unwrap();

    let events = hook.events.lock().unwrap();
    let expected = vec![
        (SaveActionType::BeforeAdding, "SalesOrder"),
        (SaveActionType::BeforeAdding, "SalesOrderLine"),
        (SaveActionType::BeforeAdding, "Memo"),
        (SaveActionType::Added, "SalesOrderLine"),
        (SaveActionType::Added, "Memo"),
        (SaveActionType::Added, "SalesOrder"),
    ];
    let actual: Vec<(SaveActionType, &str)> = events
        .iter()
        .map(|(action, code)| (*action, code.as_str()))
        .collect();
    assert_eq!(actual, expected);
}

struct RejectingHook;

impl SaveActionHook for RejectingHook {
    fn on_save_action(
        &self,
        _action: SaveActionType,
        _trigger: &mut BusinessObject,
        _repository: &mut BoRepository,
    ) -> RepoResult<bool> {
        Ok(false)
    }
}

#[test]
fn base_hook_rejection_aborts_save() {
    let mut service = service_with(&RepositoryConfig::default(), |dispatcher| {
        dispatcher.with_base_hook(Arc::new(RejectingHook))
    });
    let mut bo = BusinessObject::new("Item");

    let err = service.save(&mut bo).unwrap_err();
    assert!(matches!(err, RepoError::InvalidInput(_)));
    assert_eq!(row_count(&service, "bo_records"), 0);
}

#[derive(Default)]
struct ApprovalLog {
    entries: Mutex<Vec<String>>,
}

impl ApprovalLog {
    fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

struct FakeProcess {
    log: Arc<ApprovalLog>,
    allowed_user: i64,
}

impl ApprovalProcess for FakeProcess {
    fn is_new(&self) -> bool {
        false
    }

    fn check_to_save(&self, user: &User) -> RepoResult<()> {
        if user.id == self.allowed_user {
            Ok(())
        } else {
            Err(RepoError::ApprovalAuthorization(format!(
                "user {} may not change approved data",
                user.code
            )))
        }
    }

    fn cancel(&mut self, token: &str, _reason: &str) -> RepoResult<()> {
        self.log.push(format!("cancel:{token}"));
        Ok(())
    }

    fn save(&mut self, repository: &mut BoRepository) -> RepoResult<()> {
        self.log
            .push(format!("save:in_transaction={}", repository.in_transaction()));
        Ok(())
    }
}

struct FakeApprovals {
    log: Arc<ApprovalLog>,
}

impl ApprovalManager for FakeApprovals {
    fn check_process(
        &self,
        _bo: &mut BusinessObject,
        _repository: &mut BoRepository,
    ) -> RepoResult<Option<Box<dyn ApprovalProcess>>> {
        Ok(Some(Box::new(FakeProcess {
            log: self.log.clone(),
            allowed_user: 1,
        })))
    }
}

fn approval_service(log: &Arc<ApprovalLog>, user: User) -> BoRepositoryService {
    let approvals = Arc::new(FakeApprovals { log: log.clone() });
    service_with(&RepositoryConfig::default(), |dispatcher| {
        dispatcher.with_user(user).with_approvals(approvals)
    })
}

#[test]
fn deleting_approval_data_cancels_process_inside_the_transaction() {
    let log = Arc::new(ApprovalLog::default());
    let mut service = approval_service(&log, User::new(1, "alice", "token-a"));
    let mut order = BusinessObject::existing("PurchaseOrder", 5);
    order.capabilities.approval_data = true;
    order.mark_deleted();

    service.save(&mut order).unwrap();
    assert_eq!(
        log.entries(),
        vec!["cancel:token-a", "save:in_transaction=true"]
    );
}

#[test]
fn tag_canceled_cancels_process_only_without_tag_deleted_flag() {
    let log = Arc::new(ApprovalLog::default());
    let mut service = approval_service(&log, User::new(1, "alice", "token-a"));

    let mut order = BusinessObject::existing("PurchaseOrder", 5);
    order.capabilities.approval_data = true;
    order.capabilities.tag_deleted = Some(false);
    order.capabilities.tag_canceled = Some(true);
    order.set_value("status", "canceled");
    service.save(&mut order).unwrap();
    assert_eq!(log.entries(), vec!["save:in_transaction=true"]);

    order.capabilities.tag_deleted = None;
    order.set_value("status", "canceled again");
    service.save(&mut order).unwrap();
    assert_eq!(
        log.entries(),
        vec![
            "save:in_transaction=true",
            "cancel:token-a",
            "save:in_transaction=true"
        ]
    );
}

#[test]
fn unauthorized_user_cannot_change_approval_data() {
    let log = Arc::new(ApprovalLog::default());
    let mut service = approval_service(&log, User::new(2, "bob", "token-b"));
    let mut order = BusinessObject::existing("PurchaseOrder", 5);
    order.capabilities.approval_data = true;
    order.set_value("amount", 10);

    let err = service.save(&mut order).unwrap_err();
    assert!(matches!(err, RepoError::ApprovalAuthorization(_)));
    assert!(log.entries().is_empty());
    assert_eq!(row_count(&service, "bo_records"), 0);
}

#[test]
fn new_approval_data_skips_authorization_but_saves_process() {
    let log = Arc::new(ApprovalLog::default());
    let mut service = approval_service(&log, User::new(2, "bob", "token-b"));
    let mut order = BusinessObject::new("PurchaseOrder");
    order.capabilities.approval_data = true;

    service.save(&mut order).unwrap();
    assert_eq!(log.entries(), vec!["save:in_transaction=true"]);
}
